//! Outbound send requests.
//!
//! An [`OutboundRequest`] is the API-neutral form of a message ready to be
//! handed to a [`crate::service::MailSender`]. It is built once per submission
//! by [`translate`] and not modified afterwards.

mod translate;

pub use translate::{ATTACHMENTS_HEADER, Translation, translate};

use graphrelay_mime::BodyKind;

/// Message body with its content kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Body text.
    pub content: String,
    /// Text or HTML.
    pub kind: BodyKind,
}

/// One recipient of the outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Email address.
    pub address: String,
}

/// A file attached to the outbound message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment name as listed in the `Attachments` header.
    pub name: String,
    /// File contents.
    pub content: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("size", &self.content.len())
            .finish()
    }
}

/// Message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    subject: String,
    body: Body,
    recipients: Vec<Recipient>,
    attachments: Vec<Attachment>,
    save_to_sent_items: bool,
}

impl OutboundRequest {
    /// Creates a request with no recipients or attachments.
    #[must_use]
    pub fn new(subject: impl Into<String>, content: impl Into<String>, kind: BodyKind) -> Self {
        Self {
            subject: subject.into(),
            body: Body {
                content: content.into(),
                kind,
            },
            recipients: Vec::new(),
            attachments: Vec::new(),
            save_to_sent_items: true,
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn with_recipient(mut self, address: impl Into<String>) -> Self {
        self.recipients.push(Recipient {
            address: address.into(),
        });
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, name: impl Into<String>, content: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            name: name.into(),
            content,
        });
        self
    }

    /// Subject line, empty if the message had none.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Message body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Recipients in envelope order.
    #[must_use]
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// Attachments that could be read.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Whether the sent message is kept in the sender's Sent Items.
    #[must_use]
    pub const fn save_to_sent_items(&self) -> bool {
        self.save_to_sent_items
    }
}
