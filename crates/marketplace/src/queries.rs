//! Read paths shared by the live views and the one-shot service calls.
//!
//! Each function resolves the session's profile through the service and then
//! runs the view's query, so a view re-running it after a change always sees
//! the identity the service currently holds.

use coopmarket_remote::{decode_rows, DataService, Embed, Query};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::entities::{
    Cooperative, CooperativeStats, Member, MemberStats, MineralListing, QueuedSubmission,
    SubmissionRecord, VerificationStatus,
};
use crate::schema::{procedures, tables};
use crate::types::{ListingFilters, MarketError, MarketResult, MarketplaceFilters, ProfileKind};

/// Number of submissions kept in a member's history.
pub const HISTORY_LIMIT: usize = 10;

/// Final sort key of every view query, so rows tied on the visible key come
/// back in the same order on every run.
const TIEBREAK: &str = "id";

fn decode_profile<T: DeserializeOwned>(value: Value, kind: ProfileKind) -> MarketResult<T> {
    let value = match value {
        Value::Array(rows) => rows.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };
    if value.is_null() {
        return Err(MarketError::ProfileNotFound(kind));
    }
    Ok(serde_json::from_value(value)?)
}

pub async fn current_cooperative(remote: &dyn DataService) -> MarketResult<Cooperative> {
    let value = remote.rpc(procedures::CURRENT_COOPERATIVE, Value::Null).await?;
    decode_profile(value, ProfileKind::Cooperative)
}

pub async fn current_member(remote: &dyn DataService) -> MarketResult<Member> {
    let value = remote.rpc(procedures::CURRENT_MEMBER, Value::Null).await?;
    decode_profile(value, ProfileKind::Member)
}

/// Members of the session's cooperative, newest first.
pub async fn member_roster(remote: &dyn DataService) -> MarketResult<Vec<Member>> {
    let cooperative = current_cooperative(remote).await?;
    let query = Query::table(tables::MEMBERS)
        .eq("cooperative_id", cooperative.id)
        .order_by("created_at", false)
        .order_by(TIEBREAK, true);
    Ok(decode_rows(remote.select(&query).await?)?)
}

pub fn verification_queue_query() -> Query {
    Query::table(tables::SUBMISSIONS)
        .columns(&["id", "quantity", "submission_date", "verification_status", "notes"])
        .embed(
            Embed::new("member", tables::MEMBERS, "member_id")
                .columns(&["full_name", "member_id", "cooperative_id"]),
        )
        .embed(
            Embed::new("mineral_listing", tables::LISTINGS, "listing_id")
                .columns(&["mineral_type", "unit", "quality_grade"]),
        )
        .eq("verification_status", VerificationStatus::Pending.as_str())
        .order_by("submission_date", false)
        .order_by(TIEBREAK, true)
}

/// Pending submissions from the session cooperative's members, newest first.
pub async fn verification_queue(remote: &dyn DataService) -> MarketResult<Vec<QueuedSubmission>> {
    let cooperative = current_cooperative(remote).await?;
    let rows = remote.select(&verification_queue_query()).await?;
    let queued: Vec<QueuedSubmission> = decode_rows(rows)?;
    Ok(queued
        .into_iter()
        .filter(|submission| submission.belongs_to(&cooperative.id))
        .collect())
}

/// The member's most recent submissions.
pub async fn submission_history(remote: &dyn DataService) -> MarketResult<Vec<SubmissionRecord>> {
    let member = current_member(remote).await?;
    let query = Query::table(tables::SUBMISSIONS)
        .columns(&["id", "quantity", "submission_date", "verification_status", "notes"])
        .embed(
            Embed::new("mineral_listing", tables::LISTINGS, "listing_id")
                .columns(&["mineral_type", "unit"]),
        )
        .eq("member_id", member.id)
        .order_by("submission_date", false)
        .order_by(TIEBREAK, true)
        .limit(HISTORY_LIMIT);
    Ok(decode_rows(remote.select(&query).await?)?)
}

pub fn member_listings_query(member_id: &str, filters: &ListingFilters) -> Query {
    let mut query = Query::table(tables::LISTINGS)
        .eq("member_id", member_id)
        .order_by("created_at", false)
        .order_by(TIEBREAK, true);

    let mineral_type = filters.mineral_type.trim();
    if !mineral_type.is_empty() {
        query = query.eq("mineral_type", mineral_type);
    }
    if let Some(status) = filters.status {
        query = query.eq("status", status.as_str());
    }
    let search = filters.search.trim();
    if !search.is_empty() {
        query = query.ilike("mineral_type", format!("%{search}%"));
    }
    query
}

pub async fn member_listings(
    remote: &dyn DataService,
    filters: &ListingFilters,
) -> MarketResult<Vec<MineralListing>> {
    let member = current_member(remote).await?;
    let query = member_listings_query(&member.id, filters);
    Ok(decode_rows(remote.select(&query).await?)?)
}

pub async fn member_stats(remote: &dyn DataService) -> MarketResult<MemberStats> {
    let member = current_member(remote).await?;
    let value = remote
        .rpc(procedures::MEMBER_STATS, json!({ "member_id": member.id }))
        .await?;
    Ok(MemberStats::from_rpc(&value))
}

pub async fn cooperative_stats(remote: &dyn DataService) -> MarketResult<CooperativeStats> {
    let cooperative = current_cooperative(remote).await?;
    let members = remote
        .count(&Query::table(tables::MEMBERS).eq("cooperative_id", cooperative.id.as_str()))
        .await?;
    let totals = remote
        .rpc(
            procedures::COOPERATIVE_TOTALS,
            json!({ "cooperative_id": cooperative.id }),
        )
        .await?;
    Ok(CooperativeStats::from_rpc(members, &totals))
}

pub fn marketplace_query(filters: &MarketplaceFilters) -> Query {
    let mut query = Query::table(tables::LISTINGS)
        .eq("status", "available")
        .order_by("price_per_unit", filters.sort.ascending())
        .order_by(TIEBREAK, true);
    let search = filters.search.trim();
    if !search.is_empty() {
        query = query.ilike("mineral_type", format!("%{search}%"));
    }
    query
}

/// Available listings from every cooperative, for the public marketplace.
pub async fn marketplace(
    remote: &dyn DataService,
    filters: &MarketplaceFilters,
) -> MarketResult<Vec<MineralListing>> {
    Ok(decode_rows(remote.select(&marketplace_query(filters)).await?)?)
}
