//! Message translation from a submitted message to an outbound request.

use graphrelay_mime::Message;
use tracing::warn;

use super::OutboundRequest;
use crate::report::DELIVERY_TARGET;

/// Header listing file paths to attach, separated by commas.
pub const ATTACHMENTS_HEADER: &str = "Attachments";

/// Result of translating one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Request to send.
    pub request: OutboundRequest,
    /// Attachment paths that could not be read.
    pub skipped: Vec<String>,
}

/// Builds an outbound request from envelope recipients and a parsed message.
///
/// Never fails: unreadable attachments are logged and listed in
/// [`Translation::skipped`], and an empty recipient list is passed through
/// for the sender to reject.
pub async fn translate(recipients: &[String], message: &Message) -> Translation {
    let mut request = OutboundRequest::new(
        message.subject().unwrap_or_default(),
        message.body_text(),
        message.body_kind(),
    );

    for recipient in recipients {
        request = request.with_recipient(recipient.as_str());
    }

    let mut skipped = Vec::new();
    for path in attachment_paths(message) {
        match tokio::fs::read(path).await {
            Ok(content) => request = request.with_attachment(path, content),
            Err(err) => {
                warn!(target: DELIVERY_TARGET, "Error reading attachment {path}: {err}");
                skipped.push(path.to_string());
            }
        }
    }

    Translation { request, skipped }
}

fn attachment_paths(message: &Message) -> impl Iterator<Item = &str> {
    message
        .headers()
        .get(ATTACHMENTS_HEADER)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
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
    use crate::report::capture::Capture;
    use graphrelay_mime::BodyKind;

    fn recipients(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_plain_message() {
        let message = Message::parse(b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello Bob");
        let translation = translate(&recipients(&["bob@example.com"]), &message).await;
        let request = translation.request;

        assert_eq!(request.subject(), "Hi");
        assert_eq!(request.body().content, "Hello Bob");
        assert_eq!(request.body().kind, BodyKind::Text);
        assert_eq!(request.recipients().len(), 1);
        assert_eq!(request.recipients()[0].address, "bob@example.com");
        assert!(request.attachments().is_empty());
        assert!(request.save_to_sent_items());
        assert!(translation.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_html_detection_is_case_insensitive() {
        let message = Message::parse(b"Content-Type: Text/HTML; charset=utf-8\r\n\r\n<b>hi</b>");
        let translation = translate(&[], &message).await;
        assert_eq!(translation.request.body().kind, BodyKind::Html);
    }

    #[tokio::test]
    async fn test_missing_subject_and_recipients() {
        let message = Message::parse(b"From: a@example.com\r\n\r\nbody");
        let translation = translate(&[], &message).await;

        assert_eq!(translation.request.subject(), "");
        assert!(translation.request.recipients().is_empty());
        assert_eq!(translation.request.body().kind, BodyKind::Text);
    }

    #[tokio::test]
    async fn test_recipients_keep_order_and_duplicates() {
        let message = Message::parse(b"Subject: x\r\n\r\n");
        let list = recipients(&["b@example.com", "a@example.com", "b@example.com"]);
        let translation = translate(&list, &message).await;

        let addresses: Vec<_> = translation
            .request
            .recipients()
            .iter()
            .map(|r| r.address.as_str())
            .collect();
        assert_eq!(addresses, ["b@example.com", "a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn test_attachments_skip_unreadable_paths() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let invoice = dir.path().join("invoice.pdf");
        let missing = dir.path().join("missing.bin");
        std::fs::write(&report, b"quarterly numbers").unwrap();
        std::fs::write(&invoice, b"%PDF-1.7").unwrap();

        let raw = format!(
            "Subject: Files\r\nAttachments: {} , {},{}, \r\n\r\nsee attached",
            report.display(),
            missing.display(),
            invoice.display()
        );
        let message = Message::parse(raw.as_bytes());
        let logs = Capture::default();
        let translation = {
            let _guard = tracing::subscriber::set_default(logs.subscriber(true));
            translate(&recipients(&["bob@example.com"]), &message).await
        };

        let output = logs.contents();
        let warnings: Vec<_> = output
            .lines()
            .filter(|line| line.contains("Error reading attachment"))
            .collect();
        assert_eq!(warnings.len(), 1, "{output}");
        assert!(warnings[0].contains("WARN"));
        assert!(warnings[0].contains(DELIVERY_TARGET));
        assert!(warnings[0].contains(&format!("Error reading attachment {}", missing.display())));

        let attachments = translation.request.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, report.display().to_string());
        assert_eq!(attachments[0].content, b"quarterly numbers");
        assert_eq!(attachments[1].name, invoice.display().to_string());
        assert_eq!(attachments[1].content, b"%PDF-1.7");
        assert_eq!(translation.skipped, vec![missing.display().to_string()]);
    }

    #[tokio::test]
    async fn test_empty_attachments_header() {
        let message = Message::parse(b"Attachments: \r\n\r\nbody");
        let translation = translate(&[], &message).await;

        assert!(translation.request.attachments().is_empty());
        assert!(translation.skipped.is_empty());
    }
}
