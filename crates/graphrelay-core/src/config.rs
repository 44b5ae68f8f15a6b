//! Relay configuration.
//!
//! Loaded from a YAML file, then overridden by `GRAPHRELAY_*` environment
//! variables with `__` between nested keys, e.g.
//! `GRAPHRELAY_AZURE__CLIENT_SECRET`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use graphrelay_smtp::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GRAPHRELAY";

/// Azure app registration used for client-credentials tokens.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AzureSettings {
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Directory (tenant) ID.
    pub tenant_id: String,
}

impl std::fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// SMTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Listen address, e.g. `0.0.0.0:2525`.
    pub address: String,
    /// Domain announced to clients.
    pub domain: String,
    /// Seconds to wait for each client line.
    pub read_timeout_secs: u64,
    /// Seconds a reply may take to write.
    pub write_timeout_secs: u64,
    /// Largest accepted message.
    pub max_message_bytes: usize,
    /// Most recipients per message.
    pub max_recipients: usize,
    /// Offer AUTH without TLS.
    pub allow_insecure_auth: bool,
}

impl SmtpSettings {
    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address is not `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| Error::Config(format!("smtp.address {:?}: {e}", self.address)))
    }
}

impl From<&SmtpSettings> for ServerConfig {
    fn from(settings: &SmtpSettings) -> Self {
        Self {
            domain: settings.domain.clone(),
            read_timeout: Duration::from_secs(settings.read_timeout_secs),
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
            max_message_bytes: settings.max_message_bytes,
            max_recipients: settings.max_recipients,
            allow_insecure_auth: settings.allow_insecure_auth,
        }
    }
}

/// Relay behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Deadline for one send call, in seconds.
    pub send_timeout_secs: u64,
}

impl RelaySettings {
    /// Deadline for one send call.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure credentials.
    pub azure: AzureSettings,
    /// SMTP listener.
    pub smtp: SmtpSettings,
    /// Relay behavior.
    pub relay: RelaySettings,
    /// Delivery log file, opened in append mode.
    pub log_file: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Loads the configuration from a YAML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong
    /// type. Call [`Config::validate`] afterwards for semantic checks.
    pub fn load(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("smtp.read_timeout_secs", 10)?
            .set_default("smtp.write_timeout_secs", 10)?
            .set_default("smtp.max_message_bytes", 1024 * 1024)?
            .set_default("smtp.max_recipients", 50)?
            .set_default("smtp.allow_insecure_auth", true)?
            .set_default("relay.send_timeout_secs", 30)?
            .set_default("log_level", "info")?
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("azure.client_id", &self.azure.client_id),
            ("azure.client_secret", &self.azure.client_secret),
            ("azure.tenant_id", &self.azure.tenant_id),
            ("smtp.domain", &self.smtp.domain),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::Config(format!("{key} is required")));
        }

        if self.log_file.as_os_str().is_empty() {
            return Err(Error::Config("log_file is required".into()));
        }

        self.smtp.socket_addr()?;

        if self.smtp.max_message_bytes == 0 {
            return Err(Error::Config("smtp.max_message_bytes must be positive".into()));
        }
        if self.smtp.max_recipients == 0 {
            return Err(Error::Config("smtp.max_recipients must be positive".into()));
        }
        if self.relay.send_timeout_secs == 0 {
            return Err(Error::Config("relay.send_timeout_secs must be positive".into()));
        }

        Ok(())
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
azure:
  client_id: "app-id"
  client_secret: "s3cret"
  tenant_id: "tenant-id"
smtp:
  address: "127.0.0.1:2525"
  domain: "relay.example.com"
log_file: "/var/log/graphrelay.log"
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_with_defaults() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.azure.client_id, "app-id");
        assert_eq!(config.azure.tenant_id, "tenant-id");
        assert_eq!(config.smtp.address, "127.0.0.1:2525");
        assert_eq!(config.smtp.read_timeout_secs, 10);
        assert_eq!(config.smtp.write_timeout_secs, 10);
        assert_eq!(config.smtp.max_message_bytes, 1_048_576);
        assert_eq!(config.smtp.max_recipients, 50);
        assert!(config.smtp.allow_insecure_auth);
        assert_eq!(config.relay.send_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_file, PathBuf::from("/var/log/graphrelay.log"));
        assert_eq!(config.log_level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_overrides() {
        let contents = format!(
            "{MINIMAL}relay:\n  send_timeout_secs: 5\nlog_level: \"debug\"\n"
        );
        let file = write_config(&contents);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.relay.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(Error::Load(_))));
    }

    #[test]
    fn test_load_missing_section() {
        let file = write_config("log_file: \"/tmp/relay.log\"\n");
        assert!(matches!(Config::load(file.path()), Err(Error::Load(_))));
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let file = write_config(MINIMAL);
        let mut config = Config::load(file.path()).unwrap();
        config.azure.client_secret = " ".into();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("azure.client_secret"));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let file = write_config(MINIMAL);
        let mut config = Config::load(file.path()).unwrap();
        config.smtp.address = "not-an-address".into();

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_log_file() {
        let file = write_config(MINIMAL);
        let mut config = Config::load(file.path()).unwrap();
        config.log_file = PathBuf::new();

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_server_config_from_settings() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).unwrap();
        let server = ServerConfig::from(&config.smtp);

        assert_eq!(server.domain, "relay.example.com");
        assert_eq!(server.read_timeout, Duration::from_secs(10));
        assert_eq!(server.max_recipients, 50);
        assert!(server.allow_insecure_auth);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let azure = AzureSettings {
            client_secret: "s3cret".into(),
            ..AzureSettings::default()
        };
        assert!(!format!("{azure:?}").contains("s3cret"));
    }
}
