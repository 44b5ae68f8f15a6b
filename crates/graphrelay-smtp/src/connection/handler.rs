//! Per-connection protocol driver.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::ServerConfig;
use super::framed::FramedStream;
use crate::auth::{self, PASSWORD_CHALLENGE, USERNAME_CHALLENGE};
use crate::backend::Session;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Drives one SMTP conversation over a stream, forwarding events to a
/// [`Session`].
///
/// The connection enforces command ordering that needs no backend knowledge
/// (greeting before MAIL, a single AUTH, recipient and size limits); the
/// session decides everything else.
pub struct Connection<S, T> {
    framed: FramedStream<T>,
    session: S,
    config: Arc<ServerConfig>,
    peer: Option<SocketAddr>,
    greeted: bool,
    authenticated: bool,
    recipients: usize,
}

impl<S, T> Connection<S, T>
where
    S: Session,
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a connection over an accepted stream.
    pub fn new(stream: T, session: S, config: Arc<ServerConfig>) -> Self {
        let framed = FramedStream::new(stream).with_read_timeout(config.read_timeout);
        Self {
            framed,
            session,
            config,
            peer: None,
            greeted: false,
            authenticated: false,
            recipients: 0,
        }
    }

    /// Records the peer address for logging.
    #[must_use]
    pub const fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Runs the conversation until QUIT, disconnect or a fatal error.
    ///
    /// The session is logged out however the conversation ends.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or timeout. A client disconnect is
    /// not an error.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.session.logout();
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let greeting = format!("{} ESMTP Service Ready", self.config.domain);
        self.reply(ReplyCode::SERVICE_READY, greeting).await?;

        loop {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) | Err(Error::ConnectionClosed) => return Ok(()),
                Err(Error::Timeout) => {
                    let _ = self.send(Error::Timeout.to_reply()).await;
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn step(&mut self) -> Result<Flow> {
        let line = match self.framed.read_line().await {
            Ok(line) => line,
            Err(e) if !e.is_fatal() => {
                self.send(e.to_reply()).await?;
                return Ok(Flow::Continue);
            }
            Err(e) => return Err(e),
        };

        match Command::parse(&line) {
            Ok(command) => {
                debug!(peer = ?self.peer, command = command.verb(), "received command");
                self.handle(command).await
            }
            Err(e) => {
                debug!(peer = ?self.peer, error = %e, "rejected command");
                self.send(e.to_reply()).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Helo { hostname } => {
                self.greet();
                let text = format!("{} Hello {hostname}", self.config.domain);
                self.reply(ReplyCode::OK, text).await?;
            }
            Command::Ehlo { hostname } => {
                self.greet();
                let mut lines = vec![format!("{} Hello {hostname}", self.config.domain)];
                lines.extend(self.extensions().iter().map(ToString::to_string));
                self.send(Reply::new(ReplyCode::OK, lines)).await?;
            }
            Command::StartTls => {
                self.reply(ReplyCode::NOT_IMPLEMENTED, "TLS not available")
                    .await?;
            }
            Command::Auth {
                mechanism,
                initial_response,
            } => self.authenticate(mechanism, initial_response).await?,
            Command::MailFrom { from, size, .. } => self.mail(from.as_ref(), size).await?,
            Command::RcptTo { to } => self.rcpt(&to).await?,
            Command::Data => self.data().await?,
            Command::Rset => {
                self.reset();
                self.reply(ReplyCode::OK, "OK").await?;
            }
            Command::Vrfy { .. } => {
                self.reply(
                    ReplyCode::CANNOT_VRFY,
                    "Cannot VRFY user, but will accept message and attempt delivery",
                )
                .await?;
            }
            Command::Noop => self.reply(ReplyCode::OK, "OK").await?,
            Command::Quit => {
                self.reply(ReplyCode::CLOSING, "Bye").await?;
                return Ok(Flow::Close);
            }
        }

        Ok(Flow::Continue)
    }

    fn extensions(&self) -> Vec<Extension> {
        let mut extensions = vec![
            Extension::Pipelining,
            Extension::EightBitMime,
            Extension::Size(self.config.max_message_bytes),
        ];
        if self.config.allow_insecure_auth {
            extensions.push(Extension::Auth(AuthMechanism::SUPPORTED.to_vec()));
        }
        extensions
    }

    fn greet(&mut self) {
        self.greeted = true;
        self.reset();
    }

    fn reset(&mut self) {
        self.session.reset();
        self.recipients = 0;
    }

    async fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        initial_response: Option<String>,
    ) -> Result<()> {
        if self.authenticated {
            return self
                .reply(ReplyCode::BAD_SEQUENCE, "Already authenticated")
                .await;
        }
        if !self.greeted {
            return self
                .reply(ReplyCode::BAD_SEQUENCE, "Please introduce yourself first")
                .await;
        }
        if !self.config.allow_insecure_auth {
            return self
                .reply(
                    ReplyCode::ENCRYPTION_REQUIRED,
                    "Encryption required for requested authentication mechanism",
                )
                .await;
        }

        let (identity, password) = match self.sasl_exchange(mechanism, initial_response).await {
            Ok(credentials) => credentials,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return self.send(e.to_reply()).await,
        };

        match self.session.auth_plain(&identity, &password) {
            Ok(()) => {
                self.authenticated = true;
                debug!(peer = ?self.peer, %identity, mechanism = mechanism.as_str(), "authenticated");
                self.reply(ReplyCode::AUTH_SUCCESS, "Authentication succeeded")
                    .await
            }
            Err(rejection) => self.send(rejection).await,
        }
    }

    async fn sasl_exchange(
        &mut self,
        mechanism: AuthMechanism,
        initial_response: Option<String>,
    ) -> Result<(String, String)> {
        match mechanism {
            AuthMechanism::Plain => {
                let payload = match initial_response {
                    Some(payload) => payload,
                    None => self.challenge("").await?,
                };
                let credentials = auth::decode_plain(&payload)?;
                Ok((credentials.identity, credentials.password))
            }
            AuthMechanism::Login => {
                let username = match initial_response {
                    Some(payload) => payload,
                    None => self.challenge(USERNAME_CHALLENGE).await?,
                };
                let username = auth::decode_line(&username)?;
                let password = self.challenge(PASSWORD_CHALLENGE).await?;
                Ok((username, auth::decode_line(&password)?))
            }
        }
    }

    async fn challenge(&mut self, text: &str) -> Result<String> {
        self.reply(ReplyCode::AUTH_CONTINUE, auth::encode_challenge(text))
            .await?;
        self.framed.read_line().await
    }

    async fn mail(&mut self, from: Option<&Address>, size: Option<usize>) -> Result<()> {
        if !self.greeted {
            return self
                .reply(ReplyCode::BAD_SEQUENCE, "Please introduce yourself first")
                .await;
        }

        let max = self.config.max_message_bytes;
        if size.is_some_and(|size| size > max) {
            return self.send(Error::MessageTooLarge(max).to_reply()).await;
        }

        match self.session.mail(from.map_or("", Address::as_str)) {
            Ok(()) => {
                self.recipients = 0;
                self.reply(ReplyCode::OK, "OK").await
            }
            Err(rejection) => self.send(rejection).await,
        }
    }

    async fn rcpt(&mut self, to: &Address) -> Result<()> {
        let max = self.config.max_recipients;
        if self.recipients >= max {
            return self
                .reply(
                    ReplyCode::INSUFFICIENT_STORAGE,
                    format!("Too many recipients (max {max})"),
                )
                .await;
        }

        match self.session.rcpt(to.as_str()) {
            Ok(()) => {
                self.recipients += 1;
                self.reply(ReplyCode::OK, "OK").await
            }
            Err(rejection) => self.send(rejection).await,
        }
    }

    async fn data(&mut self) -> Result<()> {
        if self.recipients == 0 {
            return self
                .reply(ReplyCode::BAD_SEQUENCE, "Need RCPT command first")
                .await;
        }

        self.reply(
            ReplyCode::START_DATA,
            "Start mail input; end with <CRLF>.<CRLF>",
        )
        .await?;

        let body = match self.framed.read_data(self.config.max_message_bytes).await {
            Ok(body) => body,
            Err(e @ Error::MessageTooLarge(_)) => {
                self.reset();
                return self.send(e.to_reply()).await;
            }
            Err(e) => return Err(e),
        };
        debug!(peer = ?self.peer, bytes = body.len(), "received message data");

        let outcome = self.session.data(body).await;
        self.recipients = 0;

        match outcome {
            Ok(()) => self.reply(ReplyCode::OK, "OK: message accepted").await,
            Err(rejection) => self.send(rejection).await,
        }
    }

    async fn reply(&mut self, code: ReplyCode, text: impl Into<String>) -> Result<()> {
        self.send(Reply::single(code, text)).await
    }

    async fn send(&mut self, reply: impl Into<Reply>) -> Result<()> {
        let reply = reply.into();
        tokio::time::timeout(self.config.write_timeout, self.framed.write_reply(&reply))
            .await
            .map_err(|_| Error::Timeout)?
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
    use crate::types::Rejection;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"220 relay.example.com ESMTP Service Ready\r\n";
    const EHLO_REPLY: &[u8] = b"250-relay.example.com Hello client.example.com\r\n\
250-PIPELINING\r\n250-8BITMIME\r\n250-SIZE 1048576\r\n250 AUTH PLAIN LOGIN\r\n";

    struct TestSession {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl TestSession {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl Session for TestSession {
        fn auth_plain(&mut self, identity: &str, password: &str) -> std::result::Result<(), Rejection> {
            if password == "wrong" {
                return Err(Rejection::new(ReplyCode::AUTH_FAILED, "Invalid credentials"));
            }
            self.push(format!("auth {identity} {password}"));
            Ok(())
        }

        fn mail(&mut self, from: &str) -> std::result::Result<(), Rejection> {
            self.push(format!("mail {from}"));
            Ok(())
        }

        fn rcpt(&mut self, to: &str) -> std::result::Result<(), Rejection> {
            if to.starts_with("unknown") {
                return Err(Rejection::new(ReplyCode::new(550), "No such user"));
            }
            self.push(format!("rcpt {to}"));
            Ok(())
        }

        async fn data(&mut self, body: Vec<u8>) -> std::result::Result<(), Rejection> {
            let text = String::from_utf8(body).unwrap();
            if text.contains("FAIL") {
                return Err(Rejection::transaction_failed("Send failed"));
            }
            self.push(format!("data {text}"));
            Ok(())
        }

        fn reset(&mut self) {
            self.push("reset".to_string());
        }

        fn logout(&mut self) {
            self.push("logout".to_string());
        }
    }

    async fn drive<T>(stream: T, config: ServerConfig) -> (Result<()>, Vec<String>)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let events = Arc::new(Mutex::new(Vec::new()));
        let session = TestSession {
            events: Arc::clone(&events),
        };
        let result = Connection::new(stream, session, Arc::new(config)).run().await;
        let events = events.lock().unwrap().clone();
        (result, events)
    }

    fn config() -> ServerConfig {
        ServerConfig::new("relay.example.com")
    }

    fn greeted() -> Builder {
        let mut builder = Builder::new();
        builder
            .write(GREETING)
            .read(b"EHLO client.example.com\r\n")
            .write(EHLO_REPLY);
        builder
    }

    fn build(mut builder: Builder) -> Mock {
        builder.build()
    }

    #[tokio::test]
    async fn test_full_submission() {
        let mut script = greeted();
        script
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"235 Authentication succeeded\r\n")
            .read(b"MAIL FROM:<alice@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"RCPT TO:<bob@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"DATA\r\n")
            .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
            .read(b"Subject: Hi\r\n\r\nHello Bob\r\n.\r\n")
            .write(b"250 OK: message accepted\r\n")
            .read(b"QUIT\r\n")
            .write(b"221 Bye\r\n");

        let (result, events) = drive(build(script), config()).await;

        result.unwrap();
        assert_eq!(
            events,
            vec![
                "reset",
                "auth alice@example.com secret",
                "mail alice@example.com",
                "rcpt bob@example.com",
                "data Subject: Hi\r\n\r\nHello Bob\r\n",
                "logout",
            ]
        );
    }

    #[tokio::test]
    async fn test_helo_and_simple_commands() {
        let mock = Builder::new()
            .write(GREETING)
            .read(b"HELO client.example.com\r\n")
            .write(b"250 relay.example.com Hello client.example.com\r\n")
            .read(b"NOOP\r\n")
            .write(b"250 OK\r\n")
            .read(b"VRFY bob\r\n")
            .write(b"252 Cannot VRFY user, but will accept message and attempt delivery\r\n")
            .read(b"STARTTLS\r\n")
            .write(b"502 TLS not available\r\n")
            .read(b"TURN\r\n")
            .write(b"500 Syntax error, command unrecognized: TURN\r\n")
            .read(b"RSET\r\n")
            .write(b"250 OK\r\n")
            .build();

        let (result, events) = drive(mock, config()).await;

        result.unwrap();
        assert_eq!(events, vec!["reset", "reset", "logout"]);
    }

    #[tokio::test]
    async fn test_sequence_errors() {
        let mock = Builder::new()
            .write(GREETING)
            .read(b"MAIL FROM:<alice@example.com>\r\n")
            .write(b"503 Please introduce yourself first\r\n")
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"503 Please introduce yourself first\r\n")
            .read(b"EHLO client.example.com\r\n")
            .write(EHLO_REPLY)
            .read(b"DATA\r\n")
            .write(b"503 Need RCPT command first\r\n")
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"235 Authentication succeeded\r\n")
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"503 Already authenticated\r\n")
            .build();

        let (result, events) = drive(mock, config()).await;

        result.unwrap();
        assert_eq!(
            events,
            vec!["reset", "auth alice@example.com secret", "logout"]
        );
    }

    #[tokio::test]
    async fn test_auth_login_exchange() {
        let mut script = greeted();
        script
            .read(b"AUTH LOGIN\r\n")
            .write(b"334 VXNlcm5hbWU6\r\n")
            .read(b"YWxpY2VAZXhhbXBsZS5jb20=\r\n")
            .write(b"334 UGFzc3dvcmQ6\r\n")
            .read(b"c2VjcmV0\r\n")
            .write(b"235 Authentication succeeded\r\n");

        let (result, events) = drive(build(script), config()).await;

        result.unwrap();
        assert_eq!(
            events,
            vec!["reset", "auth alice@example.com secret", "logout"]
        );
    }

    #[tokio::test]
    async fn test_auth_plain_without_initial_response() {
        let mut script = greeted();
        script
            .read(b"AUTH PLAIN\r\n")
            .write(b"334 \r\n")
            .read(b"AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"235 Authentication succeeded\r\n");

        let (result, _) = drive(build(script), config()).await;
        result.unwrap();
    }

    #[tokio::test]
    async fn test_auth_rejected_then_retried() {
        let mut script = greeted();
        script
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHdyb25n\r\n")
            .write(b"535 Invalid credentials\r\n")
            .read(b"AUTH LOGIN\r\n")
            .write(b"334 VXNlcm5hbWU6\r\n")
            .read(b"*\r\n")
            .write(b"501 Authentication cancelled\r\n")
            .read(b"AUTH CRAM-MD5\r\n")
            .write(b"504 Unsupported authentication mechanism: CRAM-MD5\r\n")
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"235 Authentication succeeded\r\n");

        let (result, events) = drive(build(script), config()).await;

        result.unwrap();
        assert_eq!(
            events,
            vec!["reset", "auth alice@example.com secret", "logout"]
        );
    }

    #[tokio::test]
    async fn test_auth_refused_without_insecure_auth() {
        let mock = Builder::new()
            .write(GREETING)
            .read(b"EHLO client.example.com\r\n")
            .write(
                b"250-relay.example.com Hello client.example.com\r\n\
250-PIPELINING\r\n250-8BITMIME\r\n250 SIZE 1048576\r\n",
            )
            .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
            .write(b"523 Encryption required for requested authentication mechanism\r\n")
            .build();

        let (result, events) = drive(mock, config().with_allow_insecure_auth(false)).await;

        result.unwrap();
        assert_eq!(events, vec!["reset", "logout"]);
    }

    #[tokio::test]
    async fn test_recipient_limit_and_rejection() {
        let mut script = greeted();
        script
            .read(b"MAIL FROM:<alice@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"RCPT TO:<unknown@example.com>\r\n")
            .write(b"550 No such user\r\n")
            .read(b"RCPT TO:<bob@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"RCPT TO:<carol@example.com>\r\n")
            .write(b"452 Too many recipients (max 1)\r\n");

        let (result, events) = drive(build(script), config().with_max_recipients(1)).await;

        result.unwrap();
        assert_eq!(
            events,
            vec!["reset", "mail alice@example.com", "rcpt bob@example.com", "logout"]
        );
    }

    #[tokio::test]
    async fn test_message_size_limits() {
        let mock = Builder::new()
            .write(GREETING)
            .read(b"HELO client.example.com\r\n")
            .write(b"250 relay.example.com Hello client.example.com\r\n")
            .read(b"MAIL FROM:<alice@example.com> SIZE=100\r\n")
            .write(b"552 Maximum message size exceeded (8 bytes)\r\n")
            .read(b"MAIL FROM:<alice@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"RCPT TO:<bob@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"DATA\r\n")
            .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
            .read(b"this body is far too long\r\n.\r\n")
            .write(b"552 Maximum message size exceeded (8 bytes)\r\n")
            .read(b"DATA\r\n")
            .write(b"503 Need RCPT command first\r\n")
            .build();

        let (result, events) = drive(mock, config().with_max_message_bytes(8)).await;

        result.unwrap();
        assert_eq!(
            events,
            vec![
                "reset",
                "mail alice@example.com",
                "rcpt bob@example.com",
                "reset",
                "logout"
            ]
        );
    }

    #[tokio::test]
    async fn test_data_rejected_by_session() {
        let mut script = greeted();
        script
            .read(b"MAIL FROM:<alice@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"RCPT TO:<bob@example.com>\r\n")
            .write(b"250 OK\r\n")
            .read(b"DATA\r\n")
            .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
            .read(b"FAIL\r\n.\r\n")
            .write(b"554 Send failed\r\n")
            .read(b"DATA\r\n")
            .write(b"503 Need RCPT command first\r\n");

        let (result, _) = drive(build(script), config()).await;
        result.unwrap();
    }

    #[tokio::test]
    async fn test_null_reverse_path() {
        let mut script = greeted();
        script
            .read(b"MAIL FROM:<>\r\n")
            .write(b"250 OK\r\n");

        let (result, events) = drive(build(script), config()).await;

        result.unwrap();
        assert_eq!(events, vec!["reset", "mail ", "logout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_sends_421() {
        let (server, mut client) = tokio::io::duplex(1024);

        let (result, events) = drive(server, config()).await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(events, vec!["logout"]);

        let mut transcript = String::new();
        client.read_to_string(&mut transcript).await.unwrap();
        assert_eq!(
            transcript,
            "220 relay.example.com ESMTP Service Ready\r\n\
421 Idle timeout, closing connection\r\n"
        );
    }
}
