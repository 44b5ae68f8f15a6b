//! SMTP server: listener, per-connection driver and framing.

mod framed;
mod handler;
mod server;

pub use framed::{FramedStream, MAX_LINE_LENGTH};
pub use handler::Connection;
pub use server::Server;

use std::time::Duration;

/// Default per-line read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-reply write timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum message size (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default maximum recipients per message.
pub const DEFAULT_MAX_RECIPIENTS: usize = 50;

/// Listener limits and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Domain announced in the greeting and EHLO reply.
    pub domain: String,
    /// How long the server waits for each client line.
    pub read_timeout: Duration,
    /// How long a single reply may take to write.
    pub write_timeout: Duration,
    /// Largest message accepted by DATA, in bytes.
    pub max_message_bytes: usize,
    /// Most RCPT commands accepted per message.
    pub max_recipients: usize,
    /// Allow AUTH on a connection without TLS.
    pub allow_insecure_auth: bool,
}

impl ServerConfig {
    /// Creates a config with default limits for the given domain.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Sets the maximum recipients per message.
    #[must_use]
    pub const fn with_max_recipients(mut self, max: usize) -> Self {
        self.max_recipients = max;
        self
    }

    /// Sets whether AUTH is offered without TLS.
    #[must_use]
    pub const fn with_allow_insecure_auth(mut self, allow: bool) -> Self {
        self.allow_insecure_auth = allow;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_recipients: DEFAULT_MAX_RECIPIENTS,
            allow_insecure_auth: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new("relay.example.com");
        assert_eq!(config.domain, "relay.example.com");
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.max_message_bytes, 1_048_576);
        assert_eq!(config.max_recipients, 50);
        assert!(config.allow_insecure_auth);
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_max_message_bytes(10)
            .with_max_recipients(2)
            .with_allow_insecure_auth(false);
        assert_eq!(config.max_message_bytes, 10);
        assert_eq!(config.max_recipients, 2);
        assert!(!config.allow_insecure_auth);
    }
}
