//! SMTP command parser.

use crate::error::{Error, Result};
use crate::types::{Address, AuthMechanism};

/// SMTP command received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address, `None` for the null reverse path
        from: Option<Address>,
        /// BODY parameter (7BIT, 8BITMIME)
        body: Option<String>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// VRFY - Verify address
    Vrfy {
        /// Address to verify
        address: String,
    },
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Parses one command line, without its trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for an unrecognized verb and
    /// [`Error::Syntax`], [`Error::InvalidAddress`] or
    /// [`Error::UnsupportedMechanism`] for malformed arguments.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, args) = line
            .trim_start()
            .split_once(' ')
            .unwrap_or((line.trim_start(), ""));
        let args = args.trim();

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Self::Helo {
                hostname: required(args, "HELO requires a domain")?.to_string(),
            }),
            "EHLO" => Ok(Self::Ehlo {
                hostname: required(args, "EHLO requires a domain")?.to_string(),
            }),
            "STARTTLS" => Ok(Self::StartTls),
            "AUTH" => parse_auth(args),
            "MAIL" => parse_mail(args),
            "RCPT" => parse_rcpt(args),
            "DATA" if args.is_empty() => Ok(Self::Data),
            "DATA" => Err(Error::Syntax("DATA takes no arguments".into())),
            "RSET" => Ok(Self::Rset),
            "VRFY" => Ok(Self::Vrfy {
                address: required(args, "VRFY requires an argument")?.to_string(),
            }),
            "NOOP" => Ok(Self::Noop),
            "QUIT" => Ok(Self::Quit),
            _ => Err(Error::UnknownCommand(verb.to_string())),
        }
    }

    /// Returns the command verb, used in logs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy { .. } => "VRFY",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }
}

fn required<'a>(args: &'a str, message: &str) -> Result<&'a str> {
    if args.is_empty() {
        Err(Error::Syntax(message.to_string()))
    } else {
        Ok(args)
    }
}

/// Strips an ASCII keyword prefix, ignoring case.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let (head, tail) = s.split_at_checked(keyword.len())?;
    head.eq_ignore_ascii_case(keyword).then_some(tail)
}

fn parse_auth(args: &str) -> Result<Command> {
    let mut parts = args.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| Error::Syntax("AUTH requires a mechanism".into()))?;
    let mechanism =
        AuthMechanism::parse(name).ok_or_else(|| Error::UnsupportedMechanism(name.to_string()))?;

    Ok(Command::Auth {
        mechanism,
        initial_response: parts.next().map(str::to_string),
    })
}

fn parse_mail(args: &str) -> Result<Command> {
    let rest = strip_keyword(args, "FROM:")
        .ok_or_else(|| Error::Syntax("expected MAIL FROM:<address>".into()))?;
    let mut parts = rest.split_whitespace();
    let from = Address::parse_path(parts.next().unwrap_or_default())?;

    let mut body = None;
    let mut size = None;
    for param in parts {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        if key.eq_ignore_ascii_case("SIZE") {
            let parsed = value
                .parse()
                .map_err(|_| Error::Syntax(format!("invalid SIZE value: {value}")))?;
            size = Some(parsed);
        } else if key.eq_ignore_ascii_case("BODY") {
            body = Some(value.to_ascii_uppercase());
        }
    }

    Ok(Command::MailFrom { from, body, size })
}

fn parse_rcpt(args: &str) -> Result<Command> {
    let rest = strip_keyword(args, "TO:")
        .ok_or_else(|| Error::Syntax("expected RCPT TO:<address>".into()))?;
    let path = rest.split_whitespace().next().unwrap_or_default();
    let to = Address::parse_path(path)?
        .ok_or_else(|| Error::InvalidAddress("recipient cannot be the null path".into()))?;

    Ok(Command::RcptTo { to })
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

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_helo_command() {
        assert_eq!(
            Command::parse("HELO client.example.com").unwrap(),
            Command::Helo {
                hostname: "client.example.com".to_string()
            }
        );
    }

    #[test]
    fn test_ehlo_lowercase_with_crlf() {
        assert_eq!(
            Command::parse("ehlo client.example.com\r\n").unwrap(),
            Command::Ehlo {
                hostname: "client.example.com".to_string()
            }
        );
    }

    #[test]
    fn test_ehlo_requires_domain() {
        assert!(matches!(Command::parse("EHLO"), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_starttls_command() {
        assert_eq!(Command::parse("STARTTLS").unwrap(), Command::StartTls);
    }

    #[test]
    fn test_auth_plain_with_initial_response() {
        assert_eq!(
            Command::parse("AUTH PLAIN AHVzZXIAcGFzcw==").unwrap(),
            Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
            }
        );
    }

    #[test]
    fn test_auth_login() {
        assert_eq!(
            Command::parse("auth login").unwrap(),
            Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            }
        );
    }

    #[test]
    fn test_auth_unsupported_mechanism() {
        assert!(matches!(
            Command::parse("AUTH CRAM-MD5"),
            Err(Error::UnsupportedMechanism(name)) if name == "CRAM-MD5"
        ));
    }

    #[test]
    fn test_mail_from_simple() {
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com>").unwrap(),
            Command::MailFrom {
                from: Some(addr("sender@example.com")),
                body: None,
                size: None,
            }
        );
    }

    #[test]
    fn test_mail_from_with_params() {
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com> BODY=8bitmime SIZE=12345").unwrap(),
            Command::MailFrom {
                from: Some(addr("sender@example.com")),
                body: Some("8BITMIME".to_string()),
                size: Some(12345),
            }
        );
    }

    #[test]
    fn test_mail_from_space_after_colon() {
        let cmd = Command::parse("mail from: <sender@example.com>").unwrap();
        assert!(matches!(cmd, Command::MailFrom { from: Some(_), .. }));
    }

    #[test]
    fn test_mail_from_null_path() {
        assert_eq!(
            Command::parse("MAIL FROM:<>").unwrap(),
            Command::MailFrom {
                from: None,
                body: None,
                size: None,
            }
        );
    }

    #[test]
    fn test_mail_from_bad_size() {
        assert!(matches!(
            Command::parse("MAIL FROM:<a@example.com> SIZE=lots"),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn test_mail_without_from() {
        assert!(matches!(
            Command::parse("MAIL <a@example.com>"),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn test_rcpt_to_command() {
        assert_eq!(
            Command::parse("RCPT TO:<recipient@example.com>").unwrap(),
            Command::RcptTo {
                to: addr("recipient@example.com")
            }
        );
    }

    #[test]
    fn test_rcpt_to_null_path() {
        assert!(matches!(
            Command::parse("RCPT TO:<>"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_rcpt_to_postmaster() {
        assert_eq!(
            Command::parse("RCPT TO:<postmaster>").unwrap(),
            Command::RcptTo {
                to: addr("postmaster")
            }
        );
    }

    #[test]
    fn test_rcpt_to_invalid_address() {
        assert!(matches!(
            Command::parse("RCPT TO:<nobody>"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::parse("DATA").unwrap(), Command::Data);
        assert_eq!(Command::parse("rset").unwrap(), Command::Rset);
        assert_eq!(Command::parse("NOOP").unwrap(), Command::Noop);
        assert_eq!(Command::parse("NOOP ping").unwrap(), Command::Noop);
        assert_eq!(Command::parse("QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn test_data_with_arguments() {
        assert!(matches!(Command::parse("DATA now"), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_vrfy_command() {
        assert_eq!(
            Command::parse("VRFY postmaster").unwrap(),
            Command::Vrfy {
                address: "postmaster".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Command::parse("TURN"),
            Err(Error::UnknownCommand(verb)) if verb == "TURN"
        ));
        assert!(matches!(Command::parse(""), Err(Error::UnknownCommand(_))));
    }

    #[test]
    fn test_verb() {
        assert_eq!(Command::parse("MAIL FROM:<>").unwrap().verb(), "MAIL");
        assert_eq!(Command::Quit.verb(), "QUIT");
    }
}
