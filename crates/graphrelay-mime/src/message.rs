//! Raw message splitting.

use crate::content_type::BodyKind;
use crate::header::Headers;

/// Separator between the header block and the body.
pub const HEADER_BODY_SEPARATOR: &[u8] = b"\r\n\r\n";

/// A submitted message split into headers and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: Headers,
    body: Vec<u8>,
}

impl Message {
    /// Creates a message from already parsed parts.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Splits raw message bytes at the first blank line and parses the
    /// header block.
    ///
    /// Everything after the first `CRLF CRLF` is body, including any further
    /// blank lines. Without a separator the whole input is treated as the
    /// header block and the body is empty. Invalid UTF-8 in the header block
    /// is replaced rather than rejected.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let (head, body) = split_at_separator(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head));

        Self {
            headers,
            body: body.to_vec(),
        }
    }

    /// Returns the parsed headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the message, returning headers and body.
    #[must_use]
    pub fn into_parts(self) -> (Headers, Vec<u8>) {
        (self.headers, self.body)
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("Subject")
    }

    /// Gets the Content-Type header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// Infers the body kind from the Content-Type header.
    #[must_use]
    pub fn body_kind(&self) -> BodyKind {
        BodyKind::from_content_type(self.content_type())
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn split_at_separator(raw: &[u8]) -> (&[u8], &[u8]) {
    raw.windows(HEADER_BODY_SEPARATOR.len())
        .position(|window| window == HEADER_BODY_SEPARATOR)
        .map_or((raw, &[][..]), |pos| {
            (&raw[..pos], &raw[pos + HEADER_BODY_SEPARATOR.len()..])
        })
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
    fn test_parse_simple_message() {
        let raw = b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello Bob";
        let message = Message::parse(raw);

        assert_eq!(message.subject(), Some("Hi"));
        assert_eq!(message.content_type(), Some("text/plain"));
        assert_eq!(message.body_kind(), BodyKind::Text);
        assert_eq!(message.body(), b"Hello Bob");
    }

    #[test]
    fn test_body_keeps_later_blank_lines() {
        let raw = b"Subject: Hi\r\n\r\nfirst paragraph\r\n\r\nsecond paragraph\r\n";
        let message = Message::parse(raw);

        assert_eq!(
            message.body_text(),
            "first paragraph\r\n\r\nsecond paragraph\r\n"
        );
    }

    #[test]
    fn test_no_separator_means_empty_body() {
        let message = Message::parse(b"Subject: only headers");
        assert_eq!(message.subject(), Some("only headers"));
        assert!(message.body().is_empty());
    }

    #[test]
    fn test_empty_input() {
        let message = Message::parse(b"");
        assert!(message.headers().is_empty());
        assert!(message.body().is_empty());
    }

    #[test]
    fn test_html_body_kind() {
        let message = Message::parse(b"Content-Type: TEXT/HTML; charset=utf-8\r\n\r\n<b>x</b>");
        assert_eq!(message.body_kind(), BodyKind::Html);
    }

    #[test]
    fn test_separator_at_start() {
        let message = Message::parse(b"\r\n\r\nbody only");
        assert!(message.headers().is_empty());
        assert_eq!(message.body(), b"body only");
    }

    #[test]
    fn test_invalid_utf8_body_is_lossy() {
        let message = Message::parse(b"Subject: x\r\n\r\nab\xffcd");
        assert_eq!(message.body(), b"ab\xffcd");
        assert_eq!(message.body_text(), "ab\u{fffd}cd");
    }

    #[test]
    fn test_into_parts() {
        let (headers, body) = Message::parse(b"To: bob@example.com\r\n\r\nhi").into_parts();
        assert_eq!(headers.get("to"), Some("bob@example.com"));
        assert_eq!(body, b"hi");
    }
}
