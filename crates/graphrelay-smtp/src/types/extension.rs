//! SMTP extension types.

use std::fmt;

/// SMTP extensions advertised in the EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// AUTH - Authentication
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size
    Size(usize),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(mechanisms) => {
                f.write_str("AUTH")?;
                for mechanism in mechanisms {
                    write!(f, " {}", mechanism.as_str())?;
                }
                Ok(())
            }
            Self::Size(max) => write!(f, "SIZE {max}"),
            Self::EightBitMime => f.write_str("8BITMIME"),
            Self::Pipelining => f.write_str("PIPELINING"),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
}

impl AuthMechanism {
    /// Mechanisms the listener offers, in advertisement order.
    pub const SUPPORTED: [Self; 2] = [Self::Plain, Self::Login];

    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
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

    mod extension_display_tests {
        use super::*;

        #[test]
        fn auth() {
            let ext = Extension::Auth(AuthMechanism::SUPPORTED.to_vec());
            assert_eq!(ext.to_string(), "AUTH PLAIN LOGIN");
        }

        #[test]
        fn size() {
            assert_eq!(Extension::Size(1_048_576).to_string(), "SIZE 1048576");
        }

        #[test]
        fn keywords() {
            assert_eq!(Extension::EightBitMime.to_string(), "8BITMIME");
            assert_eq!(Extension::Pipelining.to_string(), "PIPELINING");
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse_plain() {
            assert_eq!(AuthMechanism::parse("PLAIN"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
        }

        #[test]
        fn parse_login() {
            assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(AuthMechanism::parse("CRAM-MD5"), None);
            assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
        }

        #[test]
        fn as_str() {
            assert_eq!(AuthMechanism::Plain.as_str(), "PLAIN");
            assert_eq!(AuthMechanism::Login.as_str(), "LOGIN");
        }
    }
}
