//! Create and transition actions.
//!
//! Every action is a single authenticated write (preceded by whatever lookups
//! it needs) returning the written record and a confirmation, or a
//! [`MarketError`](crate::MarketError) carrying the message to show. Nothing
//! is patched into local view state; views pick the write up from the change
//! feed.

pub mod auth_service;
pub mod cooperative_service;
pub mod member_service;
pub mod verification_service;

pub use auth_service::AuthService;
pub use cooperative_service::CooperativeService;
pub use member_service::MemberService;
pub use verification_service::VerificationService;
