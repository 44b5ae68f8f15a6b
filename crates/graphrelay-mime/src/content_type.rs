//! Body kind inference from the `Content-Type` header.

use std::fmt;

/// Kind of body content forwarded to the mail API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BodyKind {
    /// Plain text.
    #[default]
    Text,
    /// Rich text (HTML).
    Html,
}

impl BodyKind {
    /// Infers the body kind from a `Content-Type` header value.
    ///
    /// This is a substring check, not a MIME parse: any value containing
    /// `html` in any letter case selects [`BodyKind::Html`]. A missing header
    /// means plain text.
    #[must_use]
    pub fn from_content_type(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.to_ascii_lowercase().contains("html") => Self::Html,
            _ => Self::Text,
        }
    }

    /// Returns true for HTML bodies.
    #[must_use]
    pub const fn is_html(self) -> bool {
        matches!(self, Self::Html)
    }
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Html => write!(f, "html"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_content_type_is_text() {
        assert_eq!(BodyKind::from_content_type(None), BodyKind::Text);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            BodyKind::from_content_type(Some("text/plain; charset=utf-8")),
            BodyKind::Text
        );
    }

    #[test]
    fn test_html_any_case() {
        for value in ["text/html", "TEXT/HTML", "text/Html; charset=utf-8"] {
            assert_eq!(BodyKind::from_content_type(Some(value)), BodyKind::Html);
        }
    }

    #[test]
    fn test_substring_match_is_permissive() {
        // Not a real HTML type, but the check is a plain substring match.
        assert!(BodyKind::from_content_type(Some("application/xhtml+xml")).is_html());
        assert!(!BodyKind::from_content_type(Some("multipart/alternative")).is_html());
    }

    #[test]
    fn test_display() {
        assert_eq!(BodyKind::Text.to_string(), "text");
        assert_eq!(BodyKind::Html.to_string(), "html");
    }
}
