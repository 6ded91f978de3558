//! Error types for marketplace actions and views.

use std::fmt;

use coopmarket_remote::RemoteError;
use thiserror::Error;

use crate::entities::VerificationStatus;

/// Which profile a session was expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Cooperative,
    Member,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileKind::Cooperative => "cooperative",
            ProfileKind::Member => "member",
        })
    }
}

/// Marketplace failures. `Display` is the message shown to the user.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    UserExists,

    #[error("Please sign in to continue")]
    NotAuthenticated,

    #[error("{0}")]
    Unauthorized(String),

    #[error("No {0} profile found. Please contact support.")]
    ProfileNotFound(ProfileKind),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Listing is not available for submissions")]
    ListingUnavailable,

    #[error("Submission has already been {0}")]
    AlreadyDecided(VerificationStatus),

    /// A failed query or write; carries the service's message verbatim.
    #[error("{0}")]
    Request(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

/// How a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad credentials or duplicate registration; the form stays filled in.
    Authentication,
    /// Missing session or role; blocks the view.
    Authorization,
    /// The session has no cooperative or member profile.
    Configuration,
    /// Input rejected before anything was sent.
    Validation,
    /// Query or write failure; local state is unchanged.
    Request,
}

impl MarketError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MarketError::InvalidCredentials | MarketError::UserExists => {
                ErrorCategory::Authentication
            }
            MarketError::NotAuthenticated | MarketError::Unauthorized(_) => {
                ErrorCategory::Authorization
            }
            MarketError::ProfileNotFound(_) => ErrorCategory::Configuration,
            MarketError::Validation(_) => ErrorCategory::Validation,
            MarketError::NotFound(_)
            | MarketError::ListingUnavailable
            | MarketError::AlreadyDecided(_)
            | MarketError::Request(_) => ErrorCategory::Request,
        }
    }

    /// Blocking errors replace the view instead of showing a transient notice.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authorization | ErrorCategory::Configuration
        )
    }

    pub(crate) fn required(field: &str) -> Self {
        MarketError::Validation(format!("{field} is required"))
    }
}

impl From<RemoteError> for MarketError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::InvalidCredentials => MarketError::InvalidCredentials,
            RemoteError::UserExists => MarketError::UserExists,
            RemoteError::Unauthorized(message) => MarketError::Unauthorized(message),
            RemoteError::Rejected { message, .. } => MarketError::Request(message),
            other => MarketError::Request(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::from(RemoteError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            MarketError::ProfileNotFound(ProfileKind::Cooperative).to_string(),
            "No cooperative profile found. Please contact support."
        );
        assert_eq!(
            MarketError::ProfileNotFound(ProfileKind::Member).to_string(),
            "No member profile found. Please contact support."
        );
        assert_eq!(
            MarketError::AlreadyDecided(VerificationStatus::Rejected).to_string(),
            "Submission has already been rejected"
        );
        assert_eq!(MarketError::NotFound("Listing").to_string(), "Listing not found");
    }

    #[test]
    fn test_remote_messages_pass_through() {
        let rejected = RemoteError::rejected(409, "duplicate key value violates unique constraint");
        assert_eq!(
            MarketError::from(rejected).to_string(),
            "duplicate key value violates unique constraint"
        );
        assert_eq!(
            MarketError::from(RemoteError::Network("timed out".into())).to_string(),
            "Network error: timed out"
        );
        assert_eq!(
            MarketError::from(RemoteError::InvalidCredentials),
            MarketError::InvalidCredentials
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(MarketError::UserExists.category(), ErrorCategory::Authentication);
        assert!(MarketError::ProfileNotFound(ProfileKind::Member).is_blocking());
        assert!(MarketError::NotAuthenticated.is_blocking());
        assert!(!MarketError::Request("boom".into()).is_blocking());
        assert_eq!(
            MarketError::Validation("x".into()).category(),
            ErrorCategory::Validation
        );
    }
}
