//! Relay sessions.
//!
//! [`Relay`] is the SMTP backend: one [`RelaySession`] per connection keeps
//! the envelope and turns each completed DATA into a single send through
//! the shared [`MailSender`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphrelay_mime::Message;
use graphrelay_smtp::{Backend, Rejection, Session};
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::error::{SendError, SessionError};
use crate::outbound::translate;
use crate::report::{DeliveryRecord, DeliveryReporter};
use crate::service::MailSender;

/// Default deadline for one send call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP backend relaying every accepted message through a [`MailSender`].
#[derive(Clone)]
pub struct Relay {
    sender: Arc<dyn MailSender>,
    reporter: DeliveryReporter,
    send_timeout: Duration,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Creates a relay with the default send timeout.
    #[must_use]
    pub fn new(sender: Arc<dyn MailSender>) -> Self {
        Self {
            sender,
            reporter: DeliveryReporter,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Sets the deadline for one send call.
    #[must_use]
    pub const fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Returns the send deadline.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl Backend for Relay {
    type Session = RelaySession;

    fn new_session(&self, peer: Option<SocketAddr>) -> Self::Session {
        RelaySession::new(self.clone(), peer)
    }
}

/// Transaction progress within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transaction open.
    #[default]
    Idle,
    /// MAIL accepted.
    HasSender,
    /// At least one RCPT accepted.
    HasRecipients,
}

/// State of one SMTP connection.
#[derive(Debug)]
pub struct RelaySession {
    relay: Relay,
    peer: Option<SocketAddr>,
    state: SessionState,
    envelope: Envelope,
}

impl RelaySession {
    fn new(relay: Relay, peer: Option<SocketAddr>) -> Self {
        Self {
            relay,
            peer,
            state: SessionState::Idle,
            envelope: Envelope::new(),
        }
    }

    /// Current transaction state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Current envelope.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Records the authenticated principal. Any credentials are accepted;
    /// the principal is the mailbox messages are sent as.
    pub fn authenticate(&mut self, identity: &str) {
        debug!(peer = ?self.peer, identity, "session authenticated");
        self.envelope.set_identity(identity);
    }

    /// Opens a transaction for `from`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BadSequence`] if a transaction is already open.
    pub fn start(&mut self, from: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::BadSequence("Sender already specified"));
        }
        self.envelope.set_sender(from);
        self.state = SessionState::HasSender;
        Ok(())
    }

    /// Adds a recipient to the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BadSequence`] before MAIL.
    pub fn add_recipient(&mut self, to: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Idle {
            return Err(SessionError::BadSequence("Need MAIL command first"));
        }
        self.envelope.add_recipient(to);
        self.state = SessionState::HasRecipients;
        Ok(())
    }

    /// Sends the submitted message and closes the transaction.
    ///
    /// Exactly one delivery record is written for every send attempt. The
    /// envelope is reset whether or not the send succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BadSequence`] without recipients,
    /// [`SessionError::MissingIdentity`] with nobody to send as, and
    /// [`SessionError::Send`] if the send fails or times out.
    pub async fn submit(&mut self, raw: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::HasRecipients {
            return Err(SessionError::BadSequence("Need RCPT command first"));
        }

        let result = self.deliver(raw).await;
        self.clear();
        result
    }

    async fn deliver(&self, raw: &[u8]) -> Result<(), SessionError> {
        let identity = self
            .envelope
            .send_as()
            .ok_or(SessionError::MissingIdentity)?;
        let recipients = self.envelope.recipients();

        let message = Message::parse(raw);
        let translation = translate(recipients, &message).await;

        let sent = tokio::time::timeout(
            self.relay.send_timeout,
            self.relay.sender.send(identity, &translation.request),
        )
        .await
        .unwrap_or(Err(SendError::Timeout(self.relay.send_timeout)));

        let record = match &sent {
            Ok(()) => DeliveryRecord::delivered(identity, recipients),
            Err(err) => DeliveryRecord::failed(identity, err),
        };
        self.relay.reporter.report(&record);

        sent.map_err(SessionError::Send)
    }

    fn clear(&mut self) {
        self.envelope.reset();
        self.state = SessionState::Idle;
    }
}

#[async_trait]
impl Session for RelaySession {
    fn auth_plain(&mut self, identity: &str, _password: &str) -> Result<(), Rejection> {
        self.authenticate(identity);
        Ok(())
    }

    fn mail(&mut self, from: &str) -> Result<(), Rejection> {
        self.start(from).map_err(Rejection::from)
    }

    fn rcpt(&mut self, to: &str) -> Result<(), Rejection> {
        self.add_recipient(to).map_err(Rejection::from)
    }

    async fn data(&mut self, body: Vec<u8>) -> Result<(), Rejection> {
        self.submit(&body).await.map_err(Rejection::from)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn logout(&mut self) {
        info!(peer = ?self.peer, "session closed");
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
    use crate::outbound::OutboundRequest;
    use graphrelay_mime::BodyKind;
    use graphrelay_smtp::ReplyCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, OutboundRequest)>>,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<(String, OutboundRequest)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        async fn send(&self, identity: &str, request: &OutboundRequest) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((identity.to_string(), request.clone()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl MailSender for FailingSender {
        async fn send(&self, _identity: &str, _request: &OutboundRequest) -> Result<(), SendError> {
            Err(SendError::Api {
                status: 404,
                code: "ErrorInvalidUser".into(),
                message: "The requested user is invalid.".into(),
            })
        }
    }

    /// Hangs on the first send, then records like [`RecordingSender`].
    #[derive(Default)]
    struct StallOnceSender {
        stalled: AtomicBool,
        inner: RecordingSender,
    }

    #[async_trait]
    impl MailSender for StallOnceSender {
        async fn send(&self, identity: &str, request: &OutboundRequest) -> Result<(), SendError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.send(identity, request).await
        }
    }

    fn session(sender: Arc<dyn MailSender>) -> RelaySession {
        Relay::new(sender).new_session(None)
    }

    const RAW: &[u8] = b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello Bob\r\n";

    #[tokio::test]
    async fn test_submit_sends_as_identity() {
        let sender = Arc::new(RecordingSender::default());
        let mut session = session(sender.clone());

        session.authenticate("alice@example.com");
        session.start("alias@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        session
            .submit(b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello Bob")
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        let (identity, request) = &sent[0];
        assert_eq!(identity, "alice@example.com");
        assert_eq!(request.subject(), "Hi");
        assert_eq!(request.body().content, "Hello Bob");
        assert_eq!(request.body().kind, BodyKind::Text);
        assert_eq!(request.recipients().len(), 1);
        assert_eq!(request.recipients()[0].address, "bob@example.com");
        assert!(request.attachments().is_empty());
        assert!(request.save_to_sent_items());
    }

    #[tokio::test]
    async fn test_submit_falls_back_to_sender() {
        let sender = Arc::new(RecordingSender::default());
        let mut session = session(sender.clone());

        session.start("alice@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        session.submit(RAW).await.unwrap();

        assert_eq!(sender.sent()[0].0, "alice@example.com");
    }

    #[tokio::test]
    async fn test_submit_without_identity() {
        let sender = Arc::new(RecordingSender::default());
        let mut session = session(sender.clone());

        session.start("").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        let err = session.submit(RAW).await.unwrap_err();

        assert!(matches!(err, SessionError::MissingIdentity));
        assert!(sender.sent().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_envelope_resets_after_submit() {
        let sender = Arc::new(RecordingSender::default());
        let mut session = session(sender.clone());

        session.authenticate("alice@example.com");
        session.start("alice@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        session.submit(RAW).await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.envelope().recipients().is_empty());
        assert_eq!(session.envelope().identity(), Some("alice@example.com"));

        session.start("alice@example.com").unwrap();
        session.add_recipient("carol@example.com").unwrap();
        session.submit(RAW).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.recipients().len(), 1);
        assert_eq!(sent[1].1.recipients()[0].address, "carol@example.com");
    }

    #[tokio::test]
    async fn test_send_failure_resets_and_rejects() {
        let mut session = session(Arc::new(FailingSender));

        session.authenticate("ghost@example.com");
        session.start("ghost@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        let rejection = Session::data(&mut session, RAW.to_vec()).await.unwrap_err();

        assert_eq!(rejection.code, ReplyCode::TRANSACTION_FAILED);
        assert!(rejection.message.contains("ErrorInvalidUser"));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.envelope().recipients().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_is_transient() {
        let sender = Arc::new(StallOnceSender::default());
        let relay = Relay::new(sender.clone()).with_send_timeout(Duration::from_secs(30));
        let mut session = relay.new_session(None);

        session.authenticate("alice@example.com");
        session.start("alice@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();
        let rejection = Session::data(&mut session, RAW.to_vec()).await.unwrap_err();

        assert_eq!(rejection.code, ReplyCode::LOCAL_ERROR);
        assert!(rejection.message.contains("timed out after 30s"));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(sender.inner.sent().is_empty());

        Session::mail(&mut session, "alice@example.com").unwrap();
        Session::rcpt(&mut session, "carol@example.com").unwrap();
        Session::data(&mut session, RAW.to_vec()).await.unwrap();

        let sent = sender.inner.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");
        assert_eq!(sent[0].1.recipients()[0].address, "carol@example.com");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_rcpt_before_mail() {
        let mut session = session(Arc::new(RecordingSender::default()));
        let err = session.add_recipient("bob@example.com").unwrap_err();
        assert!(matches!(err, SessionError::BadSequence(_)));

        let rejection = Session::rcpt(&mut session, "bob@example.com").unwrap_err();
        assert_eq!(rejection.code, ReplyCode::BAD_SEQUENCE);
    }

    #[test]
    fn test_nested_mail_rejected() {
        let mut session = session(Arc::new(RecordingSender::default()));
        session.start("alice@example.com").unwrap();

        let rejection = Session::mail(&mut session, "eve@example.com").unwrap_err();
        assert_eq!(rejection.code, ReplyCode::BAD_SEQUENCE);
        assert_eq!(session.envelope().sender(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_data_without_recipients() {
        let sender = Arc::new(RecordingSender::default());
        let mut session = session(sender.clone());
        session.start("alice@example.com").unwrap();

        let err = session.submit(RAW).await.unwrap_err();
        assert!(matches!(err, SessionError::BadSequence(_)));
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut session = session(Arc::new(RecordingSender::default()));
        session.authenticate("alice@example.com");
        session.start("alice@example.com").unwrap();
        session.add_recipient("bob@example.com").unwrap();

        Session::reset(&mut session);

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.envelope().identity(), Some("alice@example.com"));
        assert_eq!(session.envelope().sender(), None);
    }
}
