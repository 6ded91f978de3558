//! End-to-end flows against the in-memory service.

use std::sync::Arc;
use std::time::Duration;

use coopmarket_marketplace::{
    gate, schema, views, AccessDecision, AddMemberRequest, AuthService, CooperativeService,
    CreateListingRequest, ListingFilters, ListingStatus, MarketError, MarketplaceFilters,
    MemberService, MemberStatus, PriceSort, RegisterCooperativeRequest, Route, SessionContext,
    SignInRequest, SubmitMineralRequest, VerificationDecision, VerificationService,
    VerificationStatus,
};
use coopmarket_remote::{DataService, LiveView, MemoryDataService, ViewState};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const ADMIN_EMAIL: &str = "a@coop.test";
const MEMBER_EMAIL: &str = "m@coop.test";
const PASSWORD: &str = "secret1";

struct Harness {
    memory: MemoryDataService,
    remote: Arc<dyn DataService>,
    session: SessionContext,
    auth: AuthService,
    cooperative: CooperativeService,
    member: MemberService,
    verification: VerificationService,
}

impl Harness {
    async fn new() -> Self {
        let memory = MemoryDataService::new();
        schema::install(&memory).await;
        let remote: Arc<dyn DataService> = Arc::new(memory.clone());
        let session = SessionContext::new();

        Self {
            auth: AuthService::new(Arc::clone(&remote), session.clone()),
            cooperative: CooperativeService::new(Arc::clone(&remote), session.clone()),
            member: MemberService::new(Arc::clone(&remote), session.clone()),
            verification: VerificationService::new(Arc::clone(&remote), session.clone()),
            memory,
            remote,
            session,
        }
    }

    async fn sign_in(&self, email: &str) {
        self.auth
            .sign_in(&SignInRequest {
                email: email.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap();
    }

    async fn register_and_sign_in(&self) {
        self.auth
            .register_cooperative(&RegisterCooperativeRequest {
                name: "Kivu Miners".to_string(),
                registration_number: "RC-42".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: PASSWORD.to_string(),
                phone: String::new(),
                address: "Goma".to_string(),
            })
            .await
            .unwrap();
        self.sign_in(ADMIN_EMAIL).await;
    }

    async fn add_member(&self) {
        self.cooperative
            .add_member(&AddMemberRequest {
                full_name: "Asha Mwangi".to_string(),
                member_code: "M-001".to_string(),
                email: MEMBER_EMAIL.to_string(),
                password: PASSWORD.to_string(),
                phone_number: String::new(),
            })
            .await
            .unwrap();
    }

    async fn switch_to(&self, email: &str) {
        self.auth.sign_out().await.unwrap();
        self.sign_in(email).await;
    }

    async fn create_listing(&self, mineral: &str, price: &str) -> String {
        self.member
            .create_listing(&CreateListingRequest {
                mineral_type: mineral.to_string(),
                quantity: "100".to_string(),
                unit: "kg".to_string(),
                quality_grade: "A".to_string(),
                price_per_unit: price.to_string(),
                notes: String::new(),
            })
            .await
            .unwrap()
            .record
            .id
    }

    async fn submit(&self, listing_id: &str, quantity: &str) -> MarketError {
        self.member
            .submit_mineral(&SubmitMineralRequest {
                listing_id: listing_id.to_string(),
                quantity: quantity.to_string(),
                notes: String::new(),
            })
            .await
            .unwrap_err()
    }
}

async fn settle<T: Clone + Send + Sync + 'static>(
    view: &mut LiveView<T>,
    predicate: impl FnMut(&ViewState<T>) -> bool,
) -> ViewState<T> {
    timeout(WAIT, view.wait_for(predicate))
        .await
        .expect("view did not settle in time")
        .expect("view controller stopped")
}

#[tokio::test]
async fn test_registered_cooperative_starts_empty() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;

    assert!(h.session.is_admin().await);
    let stats = h.cooperative.stats().await.unwrap();
    assert_eq!(stats.total_members, 0);
    assert_eq!(stats.total_submissions, 0);
    assert_eq!(stats.total_quantity, 0.0);
}

#[tokio::test]
async fn test_added_member_appears_in_roster() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;

    let mut roster = views::member_roster(Arc::clone(&h.remote));
    let mut stats = views::cooperative_stats(Arc::clone(&h.remote));
    settle(&mut roster, |s| !s.loading).await;

    h.add_member().await;

    let state = settle(&mut roster, |s| s.rows.len() == 1).await;
    assert_eq!(state.rows[0].member_code, "M-001");
    assert_eq!(state.rows[0].status, MemberStatus::Active);
    assert_eq!(state.error, None);

    let state = settle(&mut stats, |s| {
        s.rows.first().is_some_and(|t| t.total_members == 1)
    })
    .await;
    assert_eq!(state.rows[0].total_submissions, 0);

    // The administrator stays signed in after creating the member identity.
    assert_eq!(
        h.session.current().await.and_then(|s| s.user.email),
        Some(ADMIN_EMAIL.to_string())
    );

    roster.deactivate().await;
    stats.deactivate().await;
}

#[tokio::test]
async fn test_submission_leaves_listing_available() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;

    let listing_id = h.create_listing("Gold", "50").await;
    let listings = h.member.listings(&ListingFilters::default()).await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].status, ListingStatus::Available);
    assert_eq!(listings[0].unit, "kg");

    let outcome = h
        .member
        .submit_mineral(&SubmitMineralRequest {
            listing_id: listing_id.clone(),
            quantity: "10".to_string(),
            notes: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.record.verification_status, VerificationStatus::Pending);
    assert_eq!(outcome.notice.message(), "Submission created successfully");

    let listings = h.member.listings(&ListingFilters::default()).await.unwrap();
    assert_eq!(listings[0].status, ListingStatus::Available);

    let stats = h.member.stats().await.unwrap();
    assert_eq!(stats.total_listings, 1);
    assert_eq!(stats.total_submissions, 1);
    assert_eq!(stats.total_quantity, 10.0);
}

#[tokio::test]
async fn test_rejection_reaches_history_and_clears_queue() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;
    let listing_id = h.create_listing("Gold", "50").await;
    h.member
        .submit_mineral(&SubmitMineralRequest {
            listing_id,
            quantity: "10".to_string(),
            notes: String::new(),
        })
        .await
        .unwrap();
    h.switch_to(ADMIN_EMAIL).await;

    let mut queue = views::verification_queue(Arc::clone(&h.remote));
    let state = settle(&mut queue, |s| !s.loading).await;
    assert_eq!(state.rows.len(), 1);
    let queued = &state.rows[0];
    assert_eq!(
        queued.member.as_ref().map(|m| m.member_code.as_str()),
        Some("M-001")
    );
    assert_eq!(
        queued.mineral_listing.as_ref().map(|l| l.mineral_type.as_str()),
        Some("Gold")
    );
    let submission_id = queued.id.clone();

    let outcome = h
        .verification
        .decide(&submission_id, VerificationDecision::Rejected)
        .await
        .unwrap();
    assert_eq!(outcome.notice.message(), "Submission rejected successfully");
    assert!(outcome.record.verified_by.is_some());
    assert!(outcome.record.verification_date.is_some());

    settle(&mut queue, |s| s.rows.is_empty()).await;
    queue.deactivate().await;

    let again = h
        .verification
        .decide(&submission_id, VerificationDecision::Verified)
        .await;
    assert_eq!(
        again.unwrap_err(),
        MarketError::AlreadyDecided(VerificationStatus::Rejected)
    );

    h.switch_to(MEMBER_EMAIL).await;
    let mut history = views::submission_history(Arc::clone(&h.remote));
    let state = settle(&mut history, |s| !s.loading).await;
    assert_eq!(state.rows.len(), 1);
    assert_eq!(state.rows[0].verification_status, VerificationStatus::Rejected);
    history.deactivate().await;
}

#[tokio::test]
async fn test_members_cannot_decide() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;

    let result = h
        .verification
        .decide("any", VerificationDecision::Verified)
        .await;
    assert!(matches!(result, Err(MarketError::Unauthorized(_))));

    let session = h.session.current().await;
    assert_eq!(gate(Route::Cooperative, session.as_ref()), AccessDecision::Denied);
    assert_eq!(gate(Route::MemberArea, session.as_ref()), AccessDecision::Allow);

    h.auth.sign_out().await.unwrap();
    let session = h.session.current().await;
    assert_eq!(
        gate(Route::Dashboard, session.as_ref()),
        AccessDecision::Redirect("/login")
    );
    assert_eq!(gate(Route::Marketplace, session.as_ref()), AccessDecision::Allow);
}

#[tokio::test]
async fn test_invalid_quantity_is_never_sent() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;
    let listing_id = h.create_listing("Gold", "50").await;

    for quantity in ["", "abc", "0", "-5"] {
        let error = h.submit(&listing_id, quantity).await;
        assert!(matches!(error, MarketError::Validation(_)), "{quantity:?}: {error}");
    }
    assert_eq!(h.memory.table_len(schema::tables::SUBMISSIONS).await, 0);
}

#[tokio::test]
async fn test_submission_against_unknown_listing() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;

    let error = h.submit("missing", "5").await;
    assert_eq!(error, MarketError::NotFound("Listing"));
}

#[tokio::test]
async fn test_listing_view_follows_filters() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;
    h.create_listing("Gold", "50").await;
    h.create_listing("Copper", "8").await;

    let mut view = views::member_listings(Arc::clone(&h.remote), ListingFilters::default());
    let state = settle(&mut view, |s| !s.loading).await;
    assert_eq!(state.rows.len(), 2);

    let filters = ListingFilters {
        search: "gol".to_string(),
        ..Default::default()
    };
    let mut view = views::refilter_member_listings(view, Arc::clone(&h.remote), filters).await;
    let state = settle(&mut view, |s| s.rows.len() == 1).await;
    assert_eq!(state.rows[0].mineral_type, "Gold");
    assert_eq!(h.memory.subscriber_count().await, 1);

    view.deactivate().await;
    assert_eq!(h.memory.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_marketplace_sorts_by_price() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;
    h.create_listing("Gold", "50").await;
    h.create_listing("Copper", "8").await;
    h.create_listing("Tin", "20").await;

    let filters = MarketplaceFilters {
        search: String::new(),
        sort: PriceSort::HighToLow,
    };
    let mut view = views::marketplace(Arc::clone(&h.remote), filters);
    let state = settle(&mut view, |s| !s.loading).await;
    let prices: Vec<f64> = state.rows.iter().map(|l| l.price_per_unit).collect();
    assert_eq!(prices, vec![50.0, 20.0, 8.0]);
    view.deactivate().await;
}

#[tokio::test]
async fn test_members_submit_only_against_their_own_listings() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.cooperative
        .add_member(&AddMemberRequest {
            full_name: "Juma Bakari".to_string(),
            member_code: "M-002".to_string(),
            email: "juma@coop.test".to_string(),
            password: PASSWORD.to_string(),
            phone_number: String::new(),
        })
        .await
        .unwrap();

    h.switch_to(MEMBER_EMAIL).await;
    let listing_id = h.create_listing("Gold", "50").await;

    h.switch_to("juma@coop.test").await;
    let error = h.submit(&listing_id, "5").await;
    assert_eq!(error, MarketError::NotFound("Listing"));
    assert_eq!(h.memory.table_len(schema::tables::SUBMISSIONS).await, 0);
}

#[tokio::test]
async fn test_repeated_reads_return_the_same_order() {
    let h = Harness::new().await;
    h.register_and_sign_in().await;
    h.add_member().await;
    h.switch_to(MEMBER_EMAIL).await;
    for mineral in ["Gold", "Tin", "Copper", "Cobalt"] {
        let listing_id = h.create_listing(mineral, "20").await;
        h.member
            .submit_mineral(&SubmitMineralRequest {
                listing_id,
                quantity: "1".to_string(),
                notes: String::new(),
            })
            .await
            .unwrap();
    }

    let browse = MarketplaceFilters::default();
    let first = coopmarket_marketplace::queries::marketplace(h.remote.as_ref(), &browse)
        .await
        .unwrap();
    let second = coopmarket_marketplace::queries::marketplace(h.remote.as_ref(), &browse)
        .await
        .unwrap();
    assert_eq!(first, second);
    let ids: Vec<&str> = first.iter().map(|l| l.id.as_str()).collect();
    let mut by_id = ids.clone();
    by_id.sort();
    assert_eq!(ids, by_id, "equal prices fall back to id order");

    let filters = ListingFilters::default();
    assert_eq!(
        h.member.listings(&filters).await.unwrap(),
        h.member.listings(&filters).await.unwrap()
    );
    assert_eq!(
        h.member.submissions().await.unwrap(),
        h.member.submissions().await.unwrap()
    );

    h.switch_to(ADMIN_EMAIL).await;
    assert_eq!(
        h.verification.queue().await.unwrap(),
        h.verification.queue().await.unwrap()
    );
    assert_eq!(
        h.cooperative.members().await.unwrap(),
        h.cooperative.members().await.unwrap()
    );
}
