//! Error types for calls against the hosted data service.

use thiserror::Error;

/// Failures reported by a [`DataService`](crate::DataService) call.
///
/// The `Display` output is what a user sees, so messages coming back from the
/// service are carried verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    UserExists,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Realtime subscription failed: {0}")]
    Subscription(String),

    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    /// Constraint violation or validation failure reported by the service.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RemoteError::Subscription(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RemoteError::InvalidCredentials.to_string(),
            "Invalid login credentials"
        );
        assert_eq!(
            RemoteError::rejected(409, "duplicate key value").to_string(),
            "duplicate key value"
        );
        assert_eq!(
            RemoteError::Subscription("join refused".into()).to_string(),
            "Realtime subscription failed: join refused"
        );
    }
}
