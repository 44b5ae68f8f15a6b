//! Microsoft Graph `sendMail` client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use graphrelay_oauth::{OAuthClient, TokenCache, TokenSource};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::MailSender;
use crate::error::{Result, SendError};
use crate::outbound::OutboundRequest;

/// Default Graph API root.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/";

/// API version path segment.
const API_VERSION: &str = "v1.0";

/// `@odata.type` of a file attachment.
const FILE_ATTACHMENT_TYPE: &str = "#microsoft.graph.fileAttachment";

/// Sends mail through `POST /users/{id}/sendMail` with an app-only token.
#[derive(Debug)]
pub struct GraphClient<S = OAuthClient> {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenCache<S>,
}

impl<S: TokenSource> GraphClient<S> {
    /// Creates a client against the public Graph endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be parsed.
    pub fn new(tokens: TokenCache<S>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(GRAPH_BASE_URL)?,
            tokens,
        })
    }

    /// Points the client at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Returns the token cache.
    pub const fn tokens(&self) -> &TokenCache<S> {
        &self.tokens
    }

    fn send_mail_url(&self, identity: &str) -> std::result::Result<Url, SendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SendError::InvalidRequest(format!("cannot address {}", self.base_url)))?
            .pop_if_empty()
            .extend([API_VERSION, "users", identity, "sendMail"]);
        Ok(url)
    }
}

#[async_trait]
impl<S: TokenSource> MailSender for GraphClient<S> {
    async fn send(
        &self,
        identity: &str,
        request: &OutboundRequest,
    ) -> std::result::Result<(), SendError> {
        if identity.is_empty() {
            return Err(SendError::InvalidRequest("empty sender identity".into()));
        }

        let url = self.send_mail_url(identity)?;
        let token = self.tokens.access_token().await?;
        let payload = SendMailPayload::from(request);

        debug!(
            %url,
            recipients = request.recipients().len(),
            attachments = request.attachments().len(),
            "sending message"
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("access token rejected, clearing token cache");
            self.tokens.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, body))
    }
}

fn error_from_response(status: StatusCode, body: String) -> SendError {
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(ErrorResponse { error }) => SendError::Api {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        },
        Err(_) => SendError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailPayload<'a> {
    message: MessagePayload<'a>,
    save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload<'a> {
    subject: &'a str,
    body: BodyPayload<'a>,
    to_recipients: Vec<RecipientPayload<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BodyPayload<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecipientPayload<'a> {
    email_address: EmailAddressPayload<'a>,
}

#[derive(Serialize)]
struct EmailAddressPayload<'a> {
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload<'a> {
    #[serde(rename = "@odata.type")]
    odata_type: &'static str,
    name: &'a str,
    content_bytes: String,
}

impl<'a> From<&'a OutboundRequest> for SendMailPayload<'a> {
    fn from(request: &'a OutboundRequest) -> Self {
        let body = request.body();
        Self {
            message: MessagePayload {
                subject: request.subject(),
                body: BodyPayload {
                    content_type: if body.kind.is_html() { "html" } else { "text" },
                    content: &body.content,
                },
                to_recipients: request
                    .recipients()
                    .iter()
                    .map(|recipient| RecipientPayload {
                        email_address: EmailAddressPayload {
                            address: &recipient.address,
                        },
                    })
                    .collect(),
                attachments: request
                    .attachments()
                    .iter()
                    .map(|attachment| AttachmentPayload {
                        odata_type: FILE_ATTACHMENT_TYPE,
                        name: &attachment.name,
                        content_bytes: STANDARD.encode(&attachment.content),
                    })
                    .collect(),
            },
            save_to_sent_items: request.save_to_sent_items(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
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
    use graphrelay_mime::BodyKind;
    use graphrelay_oauth::Token;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out `token-1`, `token-2`, ... without expiry.
    #[derive(Default)]
    struct StaticSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for StaticSource {
        async fn fetch_token(&self) -> graphrelay_oauth::Result<Token> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Token::new(format!("token-{n}"), "Bearer"))
        }
    }

    fn client(server: &mockito::Server) -> GraphClient<StaticSource> {
        GraphClient::new(TokenCache::new(StaticSource::default()))
            .unwrap()
            .with_base_url(Url::parse(&server.url()).unwrap())
    }

    fn request() -> OutboundRequest {
        OutboundRequest::new("Hi", "Hello Bob", BodyKind::Text).with_recipient("bob@example.com")
    }

    #[test]
    fn test_payload_shape() {
        let request = OutboundRequest::new("Report", "<p>see attached</p>", BodyKind::Html)
            .with_recipient("bob@example.com")
            .with_recipient("carol@example.com")
            .with_attachment("report.txt", b"hello".to_vec());

        let value = serde_json::to_value(SendMailPayload::from(&request)).unwrap();
        assert_eq!(
            value,
            json!({
                "message": {
                    "subject": "Report",
                    "body": {"contentType": "html", "content": "<p>see attached</p>"},
                    "toRecipients": [
                        {"emailAddress": {"address": "bob@example.com"}},
                        {"emailAddress": {"address": "carol@example.com"}}
                    ],
                    "attachments": [{
                        "@odata.type": "#microsoft.graph.fileAttachment",
                        "name": "report.txt",
                        "contentBytes": "aGVsbG8="
                    }]
                },
                "saveToSentItems": true
            })
        );
    }

    #[test]
    fn test_payload_omits_empty_attachments() {
        let value = serde_json::to_value(SendMailPayload::from(&request())).unwrap();
        assert!(value["message"].get("attachments").is_none());
        assert_eq!(value["message"]["body"]["contentType"], "text");
    }

    #[tokio::test]
    async fn test_send_mail_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1.0/users/alice@example.com/sendMail")
            .match_header("authorization", "Bearer token-1")
            .match_body(Matcher::Json(json!({
                "message": {
                    "subject": "Hi",
                    "body": {"contentType": "text", "content": "Hello Bob"},
                    "toRecipients": [{"emailAddress": {"address": "bob@example.com"}}]
                },
                "saveToSentItems": true
            })))
            .with_status(202)
            .create_async()
            .await;

        client(&server)
            .send("alice@example.com", &request())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_reused_across_sends() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1.0/users/alice@example.com/sendMail")
            .match_header("authorization", "Bearer token-1")
            .with_status(202)
            .expect(2)
            .create_async()
            .await;

        let graph = client(&server);
        graph.send("alice@example.com", &request()).await.unwrap();
        graph.send("alice@example.com", &request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(graph.tokens().source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1.0/users/ghost@example.com/sendMail")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":{"code":"ErrorInvalidUser","message":"The requested user 'ghost@example.com' is invalid."}}"#,
            )
            .create_async()
            .await;

        let err = client(&server)
            .send("ghost@example.com", &request())
            .await
            .unwrap_err();

        match err {
            SendError::Api { status, code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(code, "ErrorInvalidUser");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unstructured_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1.0/users/alice@example.com/sendMail")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let err = client(&server)
            .send("alice@example.com", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Status { status: 503, ref body } if body == "Service Unavailable"));
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("POST", "/v1.0/users/alice@example.com/sendMail")
            .match_header("authorization", "Bearer token-1")
            .with_status(401)
            .with_body(r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired."}}"#)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/v1.0/users/alice@example.com/sendMail")
            .match_header("authorization", "Bearer token-2")
            .with_status(202)
            .create_async()
            .await;

        let graph = client(&server);
        let err = graph.send("alice@example.com", &request()).await.unwrap_err();
        assert!(matches!(err, SendError::Api { status: 401, .. }));

        graph.send("alice@example.com", &request()).await.unwrap();
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let server = mockito::Server::new_async().await;
        let err = client(&server).send("", &request()).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidRequest(_)));
    }
}
