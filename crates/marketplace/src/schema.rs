//! Table names, procedure names and the in-memory rendition of the schema.
//!
//! [`install`] gives a [`MemoryDataService`] the column defaults, unique
//! constraints and stored procedures the hosted database provides.

use coopmarket_remote::{ColumnDefault, MemoryDataService, Row, Session, TableSet};
use serde_json::{json, Value};
use tracing::debug;

pub mod tables {
    pub const COOPERATIVES: &str = "cooperatives";
    pub const MEMBERS: &str = "members";
    pub const LISTINGS: &str = "mineral_listings";
    pub const SUBMISSIONS: &str = "mineral_submissions";
}

pub mod procedures {
    pub const CURRENT_COOPERATIVE: &str = "get_current_cooperative";
    pub const CURRENT_MEMBER: &str = "get_current_member";
    pub const MEMBER_STATS: &str = "get_member_stats";
    pub const COOPERATIVE_TOTALS: &str = "get_cooperative_totals";
}

use procedures::*;
use tables::*;

pub async fn install(service: &MemoryDataService) {
    let status = |value: &str| ColumnDefault::Value(json!(value));

    service.set_default(COOPERATIVES, "created_at", ColumnDefault::Now).await;
    service.set_default(MEMBERS, "status", status("active")).await;
    service.set_default(MEMBERS, "created_at", ColumnDefault::Now).await;
    service.set_default(LISTINGS, "status", status("available")).await;
    service.set_default(LISTINGS, "created_at", ColumnDefault::Now).await;
    service
        .set_default(SUBMISSIONS, "verification_status", status("pending"))
        .await;
    service
        .set_default(SUBMISSIONS, "submission_date", ColumnDefault::Now)
        .await;
    service.set_default(SUBMISSIONS, "verified_by", ColumnDefault::Value(Value::Null)).await;
    service
        .set_default(SUBMISSIONS, "verification_date", ColumnDefault::Value(Value::Null))
        .await;

    service.add_unique(COOPERATIVES, &["contact_email"]).await;
    service.add_unique(MEMBERS, &["cooperative_id", "member_id"]).await;

    service
        .register_procedure(CURRENT_COOPERATIVE, |tables, session, _| {
            Ok(current_cooperative(tables, session))
        })
        .await;
    service
        .register_procedure(CURRENT_MEMBER, |tables, session, _| {
            Ok(current_member(tables, session))
        })
        .await;
    service
        .register_procedure(MEMBER_STATS, |tables, _, args| Ok(member_stats(tables, args)))
        .await;
    service
        .register_procedure(COOPERATIVE_TOTALS, |tables, _, args| {
            Ok(cooperative_totals(tables, args))
        })
        .await;

    debug!("marketplace schema installed");
}

fn current_cooperative(tables: &TableSet<'_>, session: Option<&Session>) -> Value {
    session
        .and_then(|s| s.user.email.as_deref())
        .and_then(|email| tables.find(COOPERATIVES, "contact_email", &json!(email)))
        .map(|row| Value::Object(row.clone()))
        .unwrap_or(Value::Null)
}

fn current_member(tables: &TableSet<'_>, session: Option<&Session>) -> Value {
    session
        .and_then(|s| tables.find(MEMBERS, "user_id", &json!(s.user.id)))
        .map(|row| Value::Object(row.clone()))
        .unwrap_or(Value::Null)
}

fn quantity_sum<'a>(rows: impl Iterator<Item = &'a Row>) -> (u64, f64) {
    rows.fold((0, 0.0), |(count, total), row| {
        let quantity = row.get("quantity").and_then(Value::as_f64).unwrap_or(0.0);
        (count + 1, total + quantity)
    })
}

fn member_stats(tables: &TableSet<'_>, args: &Value) -> Value {
    let member_id = args.get("member_id").cloned().unwrap_or(Value::Null);
    let listings = tables.filter(LISTINGS, "member_id", &member_id).len();
    let (submissions, quantity) =
        quantity_sum(tables.filter(SUBMISSIONS, "member_id", &member_id).into_iter());

    json!([{
        "total_listings": listings,
        "total_submissions": submissions,
        "total_quantity": quantity,
    }])
}

fn cooperative_totals(tables: &TableSet<'_>, args: &Value) -> Value {
    let cooperative_id = args.get("cooperative_id").cloned().unwrap_or(Value::Null);
    let members: Vec<&Value> = tables
        .filter(MEMBERS, "cooperative_id", &cooperative_id)
        .into_iter()
        .filter_map(|member| member.get("id"))
        .collect();

    let (submissions, quantity) = quantity_sum(
        tables
            .rows(SUBMISSIONS)
            .iter()
            .filter(|s| s.get("member_id").is_some_and(|id| members.contains(&id))),
    );

    json!([{
        "total_submissions": submissions,
        "total_quantity": quantity,
    }])
}
