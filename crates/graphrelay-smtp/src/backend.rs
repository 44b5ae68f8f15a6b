//! Session backend traits.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::types::Rejection;

/// Creates one [`Session`] per accepted connection.
pub trait Backend: Send + Sync + 'static {
    /// Session type handed to each connection.
    type Session: Session + 'static;

    /// Creates the session for a new connection.
    fn new_session(&self, peer: Option<SocketAddr>) -> Self::Session;
}

/// Receives the protocol events of one SMTP connection.
///
/// A returned [`Rejection`] is sent to the client verbatim; the connection
/// stays open.
#[async_trait]
pub trait Session: Send {
    /// Records the credentials presented by AUTH PLAIN or AUTH LOGIN.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the credentials are refused.
    fn auth_plain(&mut self, identity: &str, password: &str) -> Result<(), Rejection>;

    /// Starts a transaction for a sender. The null reverse path is `""`.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the sender is refused.
    fn mail(&mut self, from: &str) -> Result<(), Rejection>;

    /// Adds a recipient to the current transaction.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the recipient is refused or no sender is set.
    fn rcpt(&mut self, to: &str) -> Result<(), Rejection>;

    /// Takes the complete message body, dot-unstuffed and without the
    /// terminating `.` line.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the message cannot be delivered.
    async fn data(&mut self, body: Vec<u8>) -> Result<(), Rejection>;

    /// Discards the current transaction.
    fn reset(&mut self);

    /// Called once when the connection ends, however it ends.
    fn logout(&mut self);
}
