//! Outbound sender abstraction.

use async_trait::async_trait;

use crate::error::SendError;
use crate::outbound::OutboundRequest;

/// Delivers an outbound request on behalf of a mailbox.
///
/// Implementations must be safe to share across concurrent sessions.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Sends `request` as the mailbox `identity`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] describing why the message was not accepted.
    async fn send(&self, identity: &str, request: &OutboundRequest) -> Result<(), SendError>;
}
