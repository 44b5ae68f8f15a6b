//! SASL payload decoding for the server side of SMTP AUTH.
//!
//! Implements:
//! - PLAIN (RFC 4616): one base64 payload `authzid\0authcid\0password`
//! - LOGIN: base64 username and password sent as answers to two challenges

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Challenge text sent before the LOGIN username.
pub const USERNAME_CHALLENGE: &str = "Username:";

/// Challenge text sent before the LOGIN password.
pub const PASSWORD_CHALLENGE: &str = "Password:";

/// Credentials carried by a PLAIN payload.
#[derive(Clone, PartialEq, Eq)]
pub struct PlainCredentials {
    /// Authorization identity, usually empty.
    pub authorization_id: String,
    /// Authentication identity (the username).
    pub identity: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainCredentials")
            .field("authorization_id", &self.authorization_id)
            .field("identity", &self.identity)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decodes a PLAIN response (RFC 4616).
///
/// # Errors
///
/// Returns [`Error::AuthCancelled`] for `*`, and
/// [`Error::InvalidAuthPayload`] if the payload is not base64, not UTF-8,
/// lacks exactly three NUL-separated fields, or has an empty identity.
pub fn decode_plain(response: &str) -> Result<PlainCredentials> {
    let decoded = decode_line(response)?;
    let mut fields = decoded.split('\0');

    let (Some(authorization_id), Some(identity), Some(password), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::InvalidAuthPayload(
            "expected authzid\\0authcid\\0password".into(),
        ));
    };

    if identity.is_empty() {
        return Err(Error::InvalidAuthPayload("empty identity".into()));
    }

    Ok(PlainCredentials {
        authorization_id: authorization_id.to_string(),
        identity: identity.to_string(),
        password: password.to_string(),
    })
}

/// Decodes one base64 client response line.
///
/// A lone `=` is the empty response (RFC 4954).
///
/// # Errors
///
/// Returns [`Error::AuthCancelled`] for `*` and
/// [`Error::InvalidAuthPayload`] for invalid base64 or UTF-8.
pub fn decode_line(response: &str) -> Result<String> {
    let response = response.trim();
    match response {
        "*" => Err(Error::AuthCancelled),
        "=" => Ok(String::new()),
        _ => {
            let bytes = STANDARD
                .decode(response)
                .map_err(|e| Error::InvalidAuthPayload(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| Error::InvalidAuthPayload(e.to_string()))
        }
    }
}

/// Encodes a challenge for a 334 reply.
#[must_use]
pub fn encode_challenge(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
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

    #[test]
    fn test_decode_plain() {
        let payload = STANDARD.encode(b"\0alice@example.com\0hunter2");
        let creds = decode_plain(&payload).unwrap();

        assert_eq!(creds.authorization_id, "");
        assert_eq!(creds.identity, "alice@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_decode_plain_with_authzid() {
        let payload = STANDARD.encode(b"admin\0alice\0pw");
        let creds = decode_plain(&payload).unwrap();
        assert_eq!(creds.authorization_id, "admin");
        assert_eq!(creds.identity, "alice");
    }

    #[test]
    fn test_decode_plain_wrong_field_count() {
        let payload = STANDARD.encode(b"alice\0pw");
        assert!(matches!(
            decode_plain(&payload),
            Err(Error::InvalidAuthPayload(_))
        ));

        let payload = STANDARD.encode(b"\0alice\0pw\0extra");
        assert!(matches!(
            decode_plain(&payload),
            Err(Error::InvalidAuthPayload(_))
        ));
    }

    #[test]
    fn test_decode_plain_empty_identity() {
        let payload = STANDARD.encode(b"\0\0pw");
        assert!(matches!(
            decode_plain(&payload),
            Err(Error::InvalidAuthPayload(_))
        ));
    }

    #[test]
    fn test_decode_plain_not_base64() {
        assert!(matches!(
            decode_plain("!!not base64!!"),
            Err(Error::InvalidAuthPayload(_))
        ));
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line("YWxpY2U=").unwrap(), "alice");
        assert_eq!(decode_line("=").unwrap(), "");
        assert!(matches!(decode_line("*"), Err(Error::AuthCancelled)));
    }

    #[test]
    fn test_encode_challenge() {
        assert_eq!(encode_challenge(USERNAME_CHALLENGE), "VXNlcm5hbWU6");
        assert_eq!(encode_challenge(PASSWORD_CHALLENGE), "UGFzc3dvcmQ6");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = PlainCredentials {
            authorization_id: String::new(),
            identity: "alice".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
