//! The marketplace's live views.
//!
//! Each view is a [`LiveView`] over one of the read paths in
//! [`queries`](crate::queries), subscribed to the tables whose changes can
//! alter its result. Single-value views (the statistics) publish a
//! one-element row set.

use std::future::Future;
use std::sync::Arc;

use coopmarket_remote::{DataService, LiveView, SubscriptionRequest};

use crate::entities::{
    CooperativeStats, Member, MemberStats, MineralListing, QueuedSubmission, SubmissionRecord,
};
use crate::queries;
use crate::schema::tables;
use crate::types::{ListingFilters, MarketResult, MarketplaceFilters};

fn live<T, F, Fut>(
    remote: Arc<dyn DataService>,
    channel: &str,
    watched: &[&str],
    fetch: F,
) -> LiveView<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Arc<dyn DataService>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MarketResult<Vec<T>>> + Send + 'static,
{
    let fetcher = Arc::clone(&remote);
    LiveView::activate(
        remote,
        SubscriptionRequest::new(channel, watched),
        move || fetch(Arc::clone(&fetcher)),
    )
}

/// Members of the signed-in administrator's cooperative.
pub fn member_roster(remote: Arc<dyn DataService>) -> LiveView<Member> {
    live(remote, "member_roster", &[tables::MEMBERS], |remote| async move {
        queries::member_roster(remote.as_ref()).await
    })
}

/// Pending submissions awaiting the administrator's decision.
pub fn verification_queue(remote: Arc<dyn DataService>) -> LiveView<QueuedSubmission> {
    live(
        remote,
        "verification_queue",
        &[tables::SUBMISSIONS],
        |remote| async move { queries::verification_queue(remote.as_ref()).await },
    )
}

/// The signed-in member's recent submissions.
pub fn submission_history(remote: Arc<dyn DataService>) -> LiveView<SubmissionRecord> {
    live(
        remote,
        "submission_history",
        &[tables::SUBMISSIONS],
        |remote| async move { queries::submission_history(remote.as_ref()).await },
    )
}

pub fn member_listings(
    remote: Arc<dyn DataService>,
    filters: ListingFilters,
) -> LiveView<MineralListing> {
    live(
        remote,
        "member_listings",
        &[tables::LISTINGS],
        move |remote| {
            let filters = filters.clone();
            async move { queries::member_listings(remote.as_ref(), &filters).await }
        },
    )
}

/// Re-key the listing view after the filters changed.
pub async fn refilter_member_listings(
    view: LiveView<MineralListing>,
    remote: Arc<dyn DataService>,
    filters: ListingFilters,
) -> LiveView<MineralListing> {
    view.retarget(move || {
        let remote = Arc::clone(&remote);
        let filters = filters.clone();
        async move { queries::member_listings(remote.as_ref(), &filters).await }
    })
    .await
}

pub fn member_stats(remote: Arc<dyn DataService>) -> LiveView<MemberStats> {
    live(
        remote,
        "member_stats",
        &[tables::LISTINGS, tables::SUBMISSIONS],
        |remote| async move { Ok(vec![queries::member_stats(remote.as_ref()).await?]) },
    )
}

pub fn cooperative_stats(remote: Arc<dyn DataService>) -> LiveView<CooperativeStats> {
    live(
        remote,
        "cooperative_stats",
        &[tables::MEMBERS, tables::SUBMISSIONS],
        |remote| async move { Ok(vec![queries::cooperative_stats(remote.as_ref()).await?]) },
    )
}

/// Public browse of available listings.
pub fn marketplace(
    remote: Arc<dyn DataService>,
    filters: MarketplaceFilters,
) -> LiveView<MineralListing> {
    live(remote, "marketplace", &[tables::LISTINGS], move |remote| {
        let filters = filters.clone();
        async move { queries::marketplace(remote.as_ref(), &filters).await }
    })
}
