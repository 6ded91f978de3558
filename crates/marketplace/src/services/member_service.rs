//! Actions of a signed-in member: listings and submissions.

use std::sync::Arc;

use coopmarket_remote::{decode_row, encode_row, DataService, Query};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::{
    Member, MemberStats, MineralListing, MineralSubmission, NewListing, NewSubmission,
    SubmissionRecord,
};
use crate::queries;
use crate::schema::tables;
use crate::session::SessionContext;
use crate::types::{
    ActionOutcome, CreateListingRequest, ListingFilters, MarketError, MarketResult,
    SubmitMineralRequest,
};

#[derive(Serialize)]
struct OwnedBy<'a, T> {
    member_id: &'a str,
    #[serde(flatten)]
    fields: &'a T,
}

pub struct MemberService {
    remote: Arc<dyn DataService>,
    session: SessionContext,
}

impl MemberService {
    pub fn new(remote: Arc<dyn DataService>, session: SessionContext) -> Self {
        Self { remote, session }
    }

    pub async fn current_member(&self) -> MarketResult<Member> {
        self.session.require().await?;
        queries::current_member(self.remote.as_ref()).await
    }

    pub async fn create_listing(
        &self,
        request: &CreateListingRequest,
    ) -> MarketResult<ActionOutcome<MineralListing>> {
        let listing: NewListing = request.validate()?;
        let member = self.current_member().await?;

        let payload = OwnedBy {
            member_id: &member.id,
            fields: &listing,
        };
        let row = self
            .remote
            .insert(tables::LISTINGS, encode_row(&payload)?)
            .await?;
        let created: MineralListing = decode_row(row)?;

        info!(
            member = %member.id,
            listing = %created.id,
            mineral = %created.mineral_type,
            "listing created"
        );
        Ok(ActionOutcome::new(created, "Listing created successfully"))
    }

    /// Record a delivery against one of the member's available listings.
    ///
    /// The listing's own status is left untouched. Listings of other members
    /// are reported as not found.
    pub async fn submit_mineral(
        &self,
        request: &SubmitMineralRequest,
    ) -> MarketResult<ActionOutcome<MineralSubmission>> {
        let submission: NewSubmission = request.validate()?;
        let member = self.current_member().await?;

        let listing = self
            .remote
            .select_single(
                &Query::table(tables::LISTINGS)
                    .eq("id", submission.listing_id.as_str())
                    .eq("member_id", member.id.as_str()),
            )
            .await?
            .ok_or(MarketError::NotFound("Listing"))?;
        let listing: MineralListing = decode_row(listing)?;
        if !listing.accepts_submissions() {
            warn!(listing = %listing.id, status = %listing.status, "submission against unavailable listing");
            return Err(MarketError::ListingUnavailable);
        }

        let payload = OwnedBy {
            member_id: &member.id,
            fields: &submission,
        };
        let row = self
            .remote
            .insert(tables::SUBMISSIONS, encode_row(&payload)?)
            .await?;
        let created: MineralSubmission = decode_row(row)?;

        info!(
            member = %member.id,
            listing = %listing.id,
            submission = %created.id,
            quantity = created.quantity,
            "submission created"
        );
        Ok(ActionOutcome::new(created, "Submission created successfully"))
    }

    pub async fn listings(&self, filters: &ListingFilters) -> MarketResult<Vec<MineralListing>> {
        self.session.require().await?;
        queries::member_listings(self.remote.as_ref(), filters).await
    }

    pub async fn submissions(&self) -> MarketResult<Vec<SubmissionRecord>> {
        self.session.require().await?;
        queries::submission_history(self.remote.as_ref()).await
    }

    pub async fn stats(&self) -> MarketResult<MemberStats> {
        self.session.require().await?;
        queries::member_stats(self.remote.as_ref()).await
    }
}
