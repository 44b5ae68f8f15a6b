//! `OAuth2` client-credentials flow.

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;

/// Something that can produce a fresh access token.
///
/// Implemented by [`OAuthClient`]; [`crate::TokenCache`] is generic over it so
/// the caching logic can be exercised without a token endpoint.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Requests a new access token.
    async fn fetch_token(&self) -> Result<Token>;
}

/// Confidential `OAuth2` client.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies).
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Checks that the client can request tokens at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the client ID or secret is missing or the provider
    /// is misconfigured.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id is empty".into()));
        }
        if self
            .client_secret
            .as_deref()
            .is_none_or(|secret| secret.trim().is_empty())
        {
            return Err(Error::InvalidConfig("client_secret is empty".into()));
        }
        self.provider.validate()
    }

    /// Form parameters for a client-credentials token request.
    fn client_credentials_params(&self) -> Result<HashMap<&'static str, String>> {
        let secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("client_secret is empty".into()))?;

        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials".to_string());
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", secret.to_string());
        params.insert("scope", self.provider.scope());
        Ok(params)
    }

    /// Requests an application token with the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the
    /// credentials.
    pub async fn client_credentials_token(&self) -> Result<Token> {
        let params = self.client_credentials_params()?;

        tracing::debug!(provider = %self.provider.name, "requesting client credentials token");

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::InvalidResponse(format!("HTTP {status}: {body}")),
                ErrorResponse::into_error,
            ));
        }

        let token_response: TokenResponse = response.json().await?;
        Token::from_response(token_response)
    }
}

#[async_trait]
impl TokenSource for OAuthClient {
    async fn fetch_token(&self) -> Result<Token> {
        self.client_credentials_token().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new("test_client_id", Provider::microsoft("tenant").unwrap())
    }

    #[test]
    fn test_oauth_client_creation() {
        let client = client();
        assert_eq!(client.client_id, "test_client_id");
        assert!(client.client_secret.is_none());
    }

    #[test]
    fn test_oauth_client_with_secret() {
        let client = client().with_client_secret("secret");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
        client.validate().unwrap();
    }

    #[test]
    fn test_validate_missing_secret() {
        assert!(matches!(client().validate(), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            client().with_client_secret(" ").validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_missing_client_id() {
        let client = OAuthClient::new("", Provider::microsoft("tenant").unwrap())
            .with_client_secret("secret");
        assert!(matches!(client.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_client_credentials_params() {
        let params = client()
            .with_client_secret("s3cret")
            .client_credentials_params()
            .unwrap();

        assert_eq!(params["grant_type"], "client_credentials");
        assert_eq!(params["client_id"], "test_client_id");
        assert_eq!(params["client_secret"], "s3cret");
        assert_eq!(params["scope"], "https://graph.microsoft.com/.default");
    }

    fn endpoint_client(server: &mockito::Server) -> OAuthClient {
        let provider = Provider::new("Test", format!("{}/tenant/oauth2/v2.0/token", server.url()))
            .unwrap()
            .with_default_scopes(vec![crate::provider::GRAPH_DEFAULT_SCOPE.to_string()]);
        OAuthClient::new("app-id", provider).with_client_secret("s3cret")
    }

    #[tokio::test]
    async fn test_client_credentials_token_request() {
        use mockito::Matcher;

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "app-id".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
                Matcher::UrlEncoded(
                    "scope".into(),
                    "https://graph.microsoft.com/.default".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"eyJ0eXAi"}"#)
            .create_async()
            .await;

        let token = endpoint_client(&server).fetch_token().await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "eyJ0eXAi");
        assert!(token.is_valid());
    }

    #[tokio::test]
    async fn test_client_credentials_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(401)
            .with_body(
                r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#,
            )
            .create_async()
            .await;

        let err = endpoint_client(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_client"));
    }

    #[tokio::test]
    async fn test_client_credentials_unparseable_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let err = endpoint_client(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(ref msg) if msg.contains("502")));
    }
}
