//! SMTP reply types.

use std::fmt;

/// SMTP reply sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Creates a single-line reply.
    #[must_use]
    pub fn single(code: ReplyCode, text: impl Into<String>) -> Self {
        Self::new(code, vec![text.into()])
    }

    /// Serializes the reply to wire format.
    ///
    /// Every line but the last uses the `code-` continuation prefix.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((last, rest)) = self.message.split_last() else {
            return write!(f, "{}\r\n", self.code);
        };

        for line in rest {
            write!(f, "{}-{line}\r\n", self.code)?;
        }
        write!(f, "{} {last}\r\n", self.code)
    }
}

/// A refusal returned by a session backend, carried to the client as a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code} {message}")]
pub struct Rejection {
    /// Reply code sent to the client.
    pub code: ReplyCode,
    /// Human-readable reason.
    pub message: String,
}

impl Rejection {
    /// Creates a rejection with an explicit code.
    #[must_use]
    pub fn new(code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 503: command issued out of order.
    #[must_use]
    pub fn bad_sequence(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::BAD_SEQUENCE, message)
    }

    /// 451: transient failure, client may retry.
    #[must_use]
    pub fn local_error(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::LOCAL_ERROR, message)
    }

    /// 554: permanent failure.
    #[must_use]
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(ReplyCode::TRANSACTION_FAILED, message)
    }
}

impl From<Rejection> for Reply {
    fn from(rejection: Rejection) -> Self {
        Self::single(rejection.code, rejection.message)
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Reply codes used by the listener
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 252 Cannot verify user, will attempt delivery
    pub const CANNOT_VRFY: Self = Self(252);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 451 Local error in processing
    pub const LOCAL_ERROR: Self = Self(451);
    /// 452 Insufficient system storage (too many recipients)
    pub const INSUFFICIENT_STORAGE: Self = Self(452);
    /// 500 Syntax error, command unrecognized
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501 Syntax error in parameters or arguments
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 502 Command not implemented
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 503 Bad sequence of commands
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 504 Command parameter not implemented
    pub const PARAMETER_NOT_IMPLEMENTED: Self = Self(504);
    /// 523 Encryption required for requested authentication mechanism
    pub const ENCRYPTION_REQUIRED: Self = Self(523);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 552 Exceeded storage allocation
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// 554 Transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);
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

    mod reply_code_tests {
        use super::*;

        #[test]
        fn success_codes() {
            assert!(ReplyCode::OK.is_success());
            assert!(ReplyCode::SERVICE_READY.is_success());
            assert!(ReplyCode::AUTH_SUCCESS.is_success());
            assert!(ReplyCode::CANNOT_VRFY.is_success());
        }

        #[test]
        fn intermediate_codes() {
            assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
            assert!(ReplyCode::START_DATA.is_intermediate());
        }

        #[test]
        fn transient_errors() {
            assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
            assert!(ReplyCode::LOCAL_ERROR.is_transient());
            assert!(ReplyCode::INSUFFICIENT_STORAGE.is_transient());
        }

        #[test]
        fn permanent_errors() {
            assert!(ReplyCode::SYNTAX_ERROR.is_permanent());
            assert!(ReplyCode::BAD_SEQUENCE.is_permanent());
            assert!(ReplyCode::EXCEEDED_STORAGE.is_permanent());
            assert!(ReplyCode::TRANSACTION_FAILED.is_permanent());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ReplyCode::OK), "250");
            assert_eq!(format!("{}", ReplyCode::SYNTAX_ERROR), "500");
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn serialize_single_line() {
            let reply = Reply::single(ReplyCode::OK, "OK");
            assert_eq!(reply.serialize(), b"250 OK\r\n");
        }

        #[test]
        fn serialize_multi_line() {
            let reply = Reply::new(
                ReplyCode::OK,
                vec![
                    "relay.example.com".to_string(),
                    "PIPELINING".to_string(),
                    "8BITMIME".to_string(),
                ],
            );
            assert_eq!(
                reply.to_string(),
                "250-relay.example.com\r\n250-PIPELINING\r\n250 8BITMIME\r\n"
            );
        }

        #[test]
        fn serialize_empty_message() {
            let reply = Reply::new(ReplyCode::START_DATA, vec![]);
            assert_eq!(reply.serialize(), b"354\r\n");
        }
    }

    mod rejection_tests {
        use super::*;

        #[test]
        fn constructors() {
            assert_eq!(Rejection::bad_sequence("x").code, ReplyCode::BAD_SEQUENCE);
            assert_eq!(Rejection::local_error("x").code, ReplyCode::LOCAL_ERROR);
            assert_eq!(
                Rejection::transaction_failed("x").code,
                ReplyCode::TRANSACTION_FAILED
            );
        }

        #[test]
        fn into_reply() {
            let reply: Reply = Rejection::bad_sequence("Need MAIL command").into();
            assert_eq!(reply.serialize(), b"503 Need MAIL command\r\n");
        }

        #[test]
        fn display() {
            let rejection = Rejection::local_error("Timed out");
            assert_eq!(rejection.to_string(), "451 Timed out");
        }
    }
}
