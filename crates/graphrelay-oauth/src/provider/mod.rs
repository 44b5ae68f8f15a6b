//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// Microsoft identity platform login host.
const MICROSOFT_LOGIN: &str = "https://login.microsoftonline.com";

/// Application scope for Microsoft Graph.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Microsoft").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Default scopes.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn new(name: impl Into<String>, token_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Microsoft identity platform configuration for one tenant.
    ///
    /// Scopes:
    /// - `https://graph.microsoft.com/.default` - application permissions
    ///   granted to the app registration (e.g. `Mail.Send`)
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant is empty or yields an invalid URL.
    pub fn microsoft(tenant_id: &str) -> Result<Self> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(Error::InvalidConfig("tenant_id is empty".into()));
        }

        Ok(Self::new(
            "Microsoft",
            format!("{MICROSOFT_LOGIN}/{tenant_id}/oauth2/v2.0/token"),
        )?
        .with_default_scopes(vec![GRAPH_DEFAULT_SCOPE.to_string()]))
    }

    /// Returns the default scopes as a space-separated string.
    #[must_use]
    pub fn scope(&self) -> String {
        self.default_scopes.join(" ")
    }

    /// Validates that required fields are set.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.token_url.as_str().is_empty() {
            return Err(Error::InvalidConfig("token_url is empty".into()));
        }
        if self.default_scopes.is_empty() {
            return Err(Error::InvalidConfig("no scopes configured".into()));
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

    #[test]
    fn test_microsoft_provider() {
        let provider = Provider::microsoft("contoso-tenant").unwrap();
        assert_eq!(provider.name, "Microsoft");
        assert_eq!(
            provider.token_url.as_str(),
            "https://login.microsoftonline.com/contoso-tenant/oauth2/v2.0/token"
        );
        assert_eq!(provider.scope(), GRAPH_DEFAULT_SCOPE);
        provider.validate().unwrap();
    }

    #[test]
    fn test_microsoft_provider_empty_tenant() {
        assert!(matches!(
            Provider::microsoft("  "),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_custom_provider() {
        let provider = Provider::new("Custom", "https://auth.example.com/token")
            .unwrap()
            .with_default_scopes(vec!["mail.send".to_string(), "offline".to_string()]);

        assert_eq!(provider.name, "Custom");
        assert_eq!(provider.scope(), "mail.send offline");
        provider.validate().unwrap();
    }

    #[test]
    fn test_provider_without_scopes_is_invalid() {
        let provider = Provider::new("Custom", "https://auth.example.com/token").unwrap();
        assert!(provider.validate().is_err());
    }

    #[test]
    fn test_invalid_token_url() {
        assert!(matches!(
            Provider::new("Bad", "not a url"),
            Err(Error::UrlError(_))
        ));
    }
}
