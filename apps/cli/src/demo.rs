//! Offline walk-through: a cooperative registers, adds a member, the member
//! lists and submits a mineral, and the administrator rejects it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coopmarket_marketplace::{
    views, AddMemberRequest, CreateListingRequest, ListingFilters, RegisterCooperativeRequest,
    SignInRequest, SubmitMineralRequest, VerificationDecision,
};
use coopmarket_remote::{LiveView, MemoryDataService, ViewState};
use coopmarket_runtime::ClientServices;
use tokio::time::timeout;
use tracing::info;

use crate::render;

const ADMIN_EMAIL: &str = "admin@kivu.coop";
const MEMBER_EMAIL: &str = "asha@kivu.coop";
const PASSWORD: &str = "demo-password";
const SETTLE: Duration = Duration::from_secs(5);

async fn settle<T: Clone + Send + Sync + 'static>(
    view: &mut LiveView<T>,
    predicate: impl FnMut(&ViewState<T>) -> bool,
) -> Result<ViewState<T>> {
    let label = view.label().to_string();
    timeout(SETTLE, view.wait_for(predicate))
        .await
        .with_context(|| format!("{label} view did not update in time"))?
        .context("view stopped")
}

async fn sign_in(services: &ClientServices, email: &str) -> Result<()> {
    services.auth.sign_out().await?;
    services
        .auth
        .sign_in(&SignInRequest {
            email: email.to_string(),
            password: PASSWORD.to_string(),
        })
        .await?;
    println!("\n--- signed in as {email} ---");
    Ok(())
}

pub async fn run() -> Result<()> {
    let services = ClientServices::offline(MemoryDataService::new()).await;
    let remote = Arc::clone(&services.remote);
    info!("running offline demo");

    let outcome = services
        .auth
        .register_cooperative(&RegisterCooperativeRequest {
            name: "Kivu Artisanal Miners".to_string(),
            registration_number: "RC-2024-017".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: PASSWORD.to_string(),
            phone: "+243 810 000 000".to_string(),
            address: "Goma, North Kivu".to_string(),
        })
        .await?;
    render::notice(&outcome.notice);
    sign_in(&services, ADMIN_EMAIL).await?;

    let mut stats = views::cooperative_stats(Arc::clone(&remote));
    let initial = settle(&mut stats, |s| !s.loading).await?;
    render::cooperative_stats(&initial.rows);

    let outcome = services
        .cooperatives
        .add_member(&AddMemberRequest {
            full_name: "Asha Mwangi".to_string(),
            member_code: "M-001".to_string(),
            email: MEMBER_EMAIL.to_string(),
            password: PASSWORD.to_string(),
            phone_number: String::new(),
        })
        .await?;
    render::notice(&outcome.notice);

    let updated = settle(&mut stats, |s| s.revision > initial.revision).await?;
    render::cooperative_stats(&updated.rows);
    stats.deactivate().await;
    render::members(&services.cooperatives.members().await?);

    sign_in(&services, MEMBER_EMAIL).await?;
    let mut listings = views::member_listings(Arc::clone(&remote), ListingFilters::default());
    settle(&mut listings, |s| !s.loading).await?;

    let outcome = services
        .members
        .create_listing(&CreateListingRequest {
            mineral_type: "Gold".to_string(),
            quantity: "100".to_string(),
            unit: "kg".to_string(),
            quality_grade: "A".to_string(),
            price_per_unit: "50".to_string(),
            notes: String::new(),
        })
        .await?;
    render::notice(&outcome.notice);
    let listing_id = outcome.record.id;

    let state = settle(&mut listings, |s| !s.rows.is_empty()).await?;
    render::listings(&state.rows);
    listings.deactivate().await;

    let outcome = services
        .members
        .submit_mineral(&SubmitMineralRequest {
            listing_id,
            quantity: "10".to_string(),
            notes: "First delivery".to_string(),
        })
        .await?;
    render::notice(&outcome.notice);
    render::history(&services.members.submissions().await?);

    sign_in(&services, ADMIN_EMAIL).await?;
    let mut queue = views::verification_queue(Arc::clone(&remote));
    let state = settle(&mut queue, |s| !s.loading).await?;
    render::queue(&state.rows);
    let submission_id = state
        .rows
        .first()
        .map(|s| s.id.clone())
        .context("the submission did not reach the queue")?;

    let outcome = services
        .verification
        .decide(&submission_id, VerificationDecision::Rejected)
        .await?;
    render::notice(&outcome.notice);
    let state = settle(&mut queue, |s| s.rows.is_empty()).await?;
    render::queue(&state.rows);
    queue.deactivate().await;

    if let Err(error) = services
        .verification
        .decide(&submission_id, VerificationDecision::Verified)
        .await
    {
        render::failure(&error.to_string());
    }

    sign_in(&services, MEMBER_EMAIL).await?;
    render::history(&services.members.submissions().await?);
    render::listings(&services.members.listings(&ListingFilters::default()).await?);

    Ok(())
}
