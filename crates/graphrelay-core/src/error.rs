//! Error types for the core library.

use std::time::Duration;

use graphrelay_smtp::Rejection;
use thiserror::Error;

/// Errors that can occur while setting up the relay.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token provider could not be built.
    #[error("OAuth error: {0}")]
    OAuth(#[from] graphrelay_oauth::Error),

    /// HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one outbound send attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// The send did not finish within the deadline.
    #[error("send timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Transport-level failure talking to the API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a structured error.
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// API error code (e.g., `ErrorInvalidUser`).
        code: String,
        /// API error message.
        message: String,
    },

    /// No access token could be obtained.
    #[error("token acquisition failed: {0}")]
    OAuth(#[from] graphrelay_oauth::Error),

    /// The API answered with an unexpected status and unparseable body.
    #[error("unexpected HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request could not be addressed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SendError {
    /// Returns true if retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Protocol-level failure of a relay session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Command issued out of order.
    #[error("{0}")]
    BadSequence(&'static str),

    /// Neither an authenticated identity nor a sender to send as.
    #[error("no identity to send as")]
    MissingIdentity,

    /// The outbound send failed.
    #[error("failed to send email: {0}")]
    Send(#[source] SendError),
}

impl From<SessionError> for Rejection {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::BadSequence(message) => Self::bad_sequence(message),
            SessionError::MissingIdentity => {
                Self::transaction_failed("Authentication required to send as a mailbox")
            }
            SessionError::Send(send) if send.is_transient() => {
                Self::local_error(format!("Temporary failure, try again later: {send}"))
            }
            SessionError::Send(send) => {
                Self::transaction_failed(format!("Transaction failed: {send}"))
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use graphrelay_smtp::ReplyCode;

    #[test]
    fn test_bad_sequence_rejection() {
        let rejection: Rejection = SessionError::BadSequence("Need MAIL command first").into();
        assert_eq!(rejection.code, ReplyCode::BAD_SEQUENCE);
        assert_eq!(rejection.message, "Need MAIL command first");
    }

    #[test]
    fn test_timeout_is_transient() {
        let rejection: Rejection =
            SessionError::Send(SendError::Timeout(Duration::from_secs(30))).into();
        assert_eq!(rejection.code, ReplyCode::LOCAL_ERROR);
        assert!(rejection.message.contains("timed out after 30s"));
    }

    #[test]
    fn test_api_error_is_permanent() {
        let err = SendError::Api {
            status: 404,
            code: "ErrorInvalidUser".into(),
            message: "The requested user is invalid.".into(),
        };
        assert!(!err.is_transient());

        let rejection: Rejection = SessionError::Send(err).into();
        assert_eq!(rejection.code, ReplyCode::TRANSACTION_FAILED);
        assert!(rejection.message.contains("ErrorInvalidUser"));
    }

    #[test]
    fn test_missing_identity_rejection() {
        let rejection: Rejection = SessionError::MissingIdentity.into();
        assert_eq!(rejection.code, ReplyCode::TRANSACTION_FAILED);
    }
}
