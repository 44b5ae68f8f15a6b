//! Email address types.

use crate::error::{Error, Result};

const POSTMASTER: &str = "postmaster";

/// Email address from an SMTP envelope path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Parses a reverse or forward path such as `<user@example.com>`.
    ///
    /// Angle brackets are optional. The null path `<>` yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is unbalanced or the address is invalid.
    pub fn parse_path(path: &str) -> Result<Option<Self>> {
        let path = path.trim();
        let unbalanced = || Error::InvalidAddress(format!("unbalanced path: {path}"));
        let inner = match path.strip_prefix('<') {
            Some(rest) => rest.strip_suffix('>').ok_or_else(unbalanced)?,
            None if path.ends_with('>') => return Err(unbalanced()),
            None => path,
        };

        if inner.is_empty() {
            return Ok(None);
        }

        // Source routes (@a,@b:user@host) are ignored per RFC 5321 section 4.1.2.
        let mailbox = inner.rsplit_once(':').map_or(inner, |(_, mailbox)| mailbox);
        Self::new(mailbox).map(Some)
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates an email address (basic validation).
    ///
    /// The bare `postmaster` mailbox is accepted in any case (RFC 5321 section 4.5.1).
    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if addr.eq_ignore_ascii_case(POSTMASTER) {
            return Ok(());
        }

        if addr.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAddress(
                "Address cannot contain whitespace".into(),
            ));
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress("Address must contain @".into()));
        };

        if domain.contains('@') {
            return Err(Error::InvalidAddress(
                "Address must have exactly one @".into(),
            ));
        }

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
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

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_invalid_address_no_at() {
        assert!(Address::new("userexample.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_invalid_address_empty_local() {
        assert!(Address::new("@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty_domain() {
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn test_invalid_address_two_at() {
        assert!(Address::new("a@b@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_whitespace() {
        assert!(Address::new("us er@example.com").is_err());
    }

    #[test]
    fn test_postmaster_without_domain() {
        assert_eq!(Address::new("postmaster").unwrap().as_str(), "postmaster");
        let addr = Address::parse_path("<Postmaster>").unwrap();
        assert_eq!(addr.unwrap().as_str(), "Postmaster");
        assert!(Address::new("webmaster").is_err());
    }

    #[test]
    fn test_parse_path_bracketed() {
        let addr = Address::parse_path("<alice@example.com>").unwrap();
        assert_eq!(addr.unwrap().as_str(), "alice@example.com");
    }

    #[test]
    fn test_parse_path_bare() {
        let addr = Address::parse_path(" bob@example.com ").unwrap();
        assert_eq!(addr.unwrap().as_str(), "bob@example.com");
    }

    #[test]
    fn test_parse_path_null() {
        assert_eq!(Address::parse_path("<>").unwrap(), None);
    }

    #[test]
    fn test_parse_path_source_route() {
        let addr = Address::parse_path("<@relay.example,@hop.example:carol@example.com>").unwrap();
        assert_eq!(addr.unwrap().as_str(), "carol@example.com");
    }

    #[test]
    fn test_parse_path_unbalanced() {
        assert!(matches!(
            Address::parse_path("<alice@example.com"),
            Err(Error::InvalidAddress(_))
        ));
    }
}
