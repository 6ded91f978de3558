//! Domain entities as the client sees them.

pub mod cooperative;
pub mod listing;
pub mod member;
pub mod stats;
pub mod submission;

pub use cooperative::{Cooperative, NewCooperative};
pub use listing::{ListingStatus, MassUnit, MineralListing, NewListing};
pub use member::{Member, MemberStatus, NewMember};
pub use stats::{CooperativeStats, MemberStats};
pub use submission::{
    ListingSummary, MemberSummary, MineralSubmission, NewSubmission, QueuedSubmission,
    SubmissionRecord, VerificationDecision, VerificationStatus,
};
