//! Per-connection envelope state.

/// Sender, recipients and authenticated identity of the message being
/// submitted on one connection.
///
/// The identity survives [`Envelope::reset`]; sender and recipients do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    identity: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl Envelope {
    /// Creates an empty envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the authenticated principal.
    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.identity = Some(identity.into());
    }

    /// Returns the authenticated principal, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Records the declared sender. The null reverse path is stored as `""`.
    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = Some(sender.into());
    }

    /// Returns the declared sender, if MAIL has been accepted.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Appends a recipient. Order is kept and duplicates are allowed.
    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        self.recipients.push(recipient.into());
    }

    /// Returns the recipients in the order they were added.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Mailbox the message is sent as: the authenticated principal, or the
    /// declared sender when the client never authenticated.
    #[must_use]
    pub fn send_as(&self) -> Option<&str> {
        let present = |mailbox: &&str| !mailbox.is_empty();
        self.identity()
            .filter(present)
            .or_else(|| self.sender().filter(present))
    }

    /// Clears sender and recipients, keeping the identity.
    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_identity() {
        let mut envelope = Envelope::new();
        envelope.set_identity("alice@example.com");
        envelope.set_sender("alice@example.com");
        envelope.add_recipient("bob@example.com");

        envelope.reset();

        assert_eq!(envelope.identity(), Some("alice@example.com"));
        assert_eq!(envelope.sender(), None);
        assert!(envelope.recipients().is_empty());
    }

    #[test]
    fn test_recipients_keep_order_and_duplicates() {
        let mut envelope = Envelope::new();
        envelope.add_recipient("b@example.com");
        envelope.add_recipient("a@example.com");
        envelope.add_recipient("b@example.com");

        assert_eq!(
            envelope.recipients(),
            ["b@example.com", "a@example.com", "b@example.com"]
        );
    }

    #[test]
    fn test_send_as_prefers_identity() {
        let mut envelope = Envelope::new();
        envelope.set_sender("alias@example.com");
        assert_eq!(envelope.send_as(), Some("alias@example.com"));

        envelope.set_identity("alice@example.com");
        assert_eq!(envelope.send_as(), Some("alice@example.com"));
    }

    #[test]
    fn test_send_as_null_sender() {
        let mut envelope = Envelope::new();
        envelope.set_sender("");
        assert_eq!(envelope.send_as(), None);
    }
}
