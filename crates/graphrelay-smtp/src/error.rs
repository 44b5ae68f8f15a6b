//! Error types for SMTP operations.

use crate::types::{Reply, ReplyCode};
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unrecognized command verb.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command recognized but its arguments are malformed.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Authentication mechanism not offered.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Malformed SASL payload.
    #[error("Invalid authentication payload: {0}")]
    InvalidAuthPayload(String),

    /// Client cancelled an authentication exchange.
    #[error("Authentication cancelled")]
    AuthCancelled,

    /// Line exceeds the maximum length.
    #[error("Line too long (max {0} bytes)")]
    LineTooLong(usize),

    /// Message data exceeds the maximum size.
    #[error("Message exceeds size limit: {0} bytes")]
    MessageTooLarge(usize),

    /// Client stayed silent past the read timeout, or a write stalled.
    #[error("Timed out")]
    Timeout,

    /// Peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Returns true if the connection cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout | Self::ConnectionClosed)
    }

    /// Maps the error to the reply sent to the client.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        let (code, text) = match self {
            Self::Io(_) | Self::ConnectionClosed => (
                ReplyCode::SERVICE_UNAVAILABLE,
                "Service not available, closing transmission channel".to_string(),
            ),
            Self::Timeout => (
                ReplyCode::SERVICE_UNAVAILABLE,
                "Idle timeout, closing connection".to_string(),
            ),
            Self::UnknownCommand(verb) => (
                ReplyCode::SYNTAX_ERROR,
                format!("Syntax error, command unrecognized: {verb}"),
            ),
            Self::Syntax(msg) => (ReplyCode::PARAMETER_ERROR, format!("Syntax error: {msg}")),
            Self::InvalidAddress(msg) => (
                ReplyCode::PARAMETER_ERROR,
                format!("Invalid address: {msg}"),
            ),
            Self::UnsupportedMechanism(name) => (
                ReplyCode::PARAMETER_NOT_IMPLEMENTED,
                format!("Unsupported authentication mechanism: {name}"),
            ),
            Self::InvalidAuthPayload(_) => (
                ReplyCode::PARAMETER_ERROR,
                "Invalid authentication payload".to_string(),
            ),
            Self::AuthCancelled => (
                ReplyCode::PARAMETER_ERROR,
                "Authentication cancelled".to_string(),
            ),
            Self::LineTooLong(max) => (
                ReplyCode::SYNTAX_ERROR,
                format!("Line too long (max {max} bytes)"),
            ),
            Self::MessageTooLarge(max) => (
                ReplyCode::EXCEEDED_STORAGE,
                format!("Maximum message size exceeded ({max} bytes)"),
            ),
        };

        Reply::single(code, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_codes() {
        assert_eq!(
            Error::UnknownCommand("FOO".into()).to_reply().code,
            ReplyCode::SYNTAX_ERROR
        );
        assert_eq!(
            Error::Syntax("missing address".into()).to_reply().code,
            ReplyCode::PARAMETER_ERROR
        );
        assert_eq!(
            Error::UnsupportedMechanism("CRAM-MD5".into()).to_reply().code,
            ReplyCode::PARAMETER_NOT_IMPLEMENTED
        );
        assert_eq!(
            Error::MessageTooLarge(1024).to_reply().code,
            ReplyCode::EXCEEDED_STORAGE
        );
        assert_eq!(Error::Timeout.to_reply().code, ReplyCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::Timeout.is_fatal());
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(!Error::LineTooLong(10).is_fatal());
        assert!(!Error::Syntax("x".into()).is_fatal());
        assert!(!Error::MessageTooLarge(10).is_fatal());
    }
}
