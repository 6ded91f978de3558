//! # Cooperative marketplace
//!
//! Cooperatives register and manage members; members list minerals and
//! submit deliveries against their listings; administrators verify those
//! submissions. All state lives in the hosted service behind
//! [`coopmarket_remote::DataService`].
//!
//! ## Architecture
//!
//! - **Entities**: rows as the client sees them
//! - **Services**: create and transition actions
//! - **Queries / Views**: read paths, and live views re-running them on change
//! - **Session / Access**: process-wide identity and route gating
//! - **Schema**: table and procedure names, plus the in-memory rendition
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use coopmarket_marketplace::{schema, views, SessionContext, MemberService};
//! use coopmarket_remote::{DataService, MemoryDataService};
//!
//! # async fn run() {
//! let memory = MemoryDataService::new();
//! schema::install(&memory).await;
//! let remote: Arc<dyn DataService> = Arc::new(memory);
//! let session = SessionContext::new();
//! session.init_from(remote.as_ref()).await;
//!
//! let members = MemberService::new(Arc::clone(&remote), session.clone());
//! let mut history = views::submission_history(remote);
//! let state = history.wait_for(|s| !s.loading).await;
//! # }
//! ```

pub mod access;
pub mod entities;
pub mod queries;
pub mod schema;
pub mod services;
pub mod session;
pub mod types;
pub mod utils;
pub mod views;

pub use access::{gate, Access, AccessDecision, Route};
pub use entities::{
    Cooperative, CooperativeStats, ListingStatus, MassUnit, Member, MemberStats, MemberStatus,
    MineralListing, MineralSubmission, QueuedSubmission, SubmissionRecord, VerificationDecision,
    VerificationStatus,
};
pub use services::{AuthService, CooperativeService, MemberService, VerificationService};
pub use session::{Role, SessionContext};
pub use types::{
    ActionOutcome, AddMemberRequest, CreateListingRequest, ErrorCategory, ListingFilters,
    MarketError, MarketResult, MarketplaceFilters, Notice, PriceSort, ProfileKind,
    RegisterCooperativeRequest, SignInRequest, SubmitMineralRequest,
};
