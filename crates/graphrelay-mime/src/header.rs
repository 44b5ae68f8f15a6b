//! Header block parsing.

use std::collections::HashMap;
use std::fmt;

/// A single header as received.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

/// Unfolded message headers, one value per name.
///
/// Names keep the spelling they were received with, lookups ignore case.
/// When a name occurs more than once the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: HashMap<String, Field>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header value, replacing any existing value for the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.fields.insert(
            name.to_ascii_lowercase(),
            Field {
                name,
                value: value.into(),
            },
        );
    }

    /// Gets the value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|field| field.value.as_str())
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    /// Returns the number of distinct headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no headers were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .map(|field| (field.name.as_str(), field.value.as_str()))
    }

    /// Parses a CRLF-separated header block.
    ///
    /// Lines starting with a space or tab continue the previous header and
    /// are appended after a single space. Lines without a colon, empty lines
    /// and continuations with nothing to continue are dropped. Parsing never
    /// fails; the worst case is a smaller map.
    #[must_use]
    pub fn parse(block: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in block.split("\r\n") {
            if line.is_empty() {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.set(name, value);
            }

            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.set(name, value);
        }

        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted: Vec<_> = self.iter().collect();
        sorted.sort_unstable();

        for (name, value) in sorted {
            write!(f, "{name}: {value}\r\n")?;
        }

        Ok(())
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
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.len(), 0);
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("content-TYPE"));
    }

    #[test]
    fn test_name_kept_as_received() {
        let headers = Headers::parse("X-Custom-Thing: yes");
        let (name, value) = headers.iter().next().unwrap();
        assert_eq!(name, "X-Custom-Thing");
        assert_eq!(value, "yes");
    }

    #[test]
    fn test_parse_simple() {
        let block = "From: sender@example.com\r\nTo: recipient@example.com\r\nSubject: Test Message";

        let headers = Headers::parse(block);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
    }

    #[test]
    fn test_parse_folded_value() {
        let block = concat!(
            "Subject: a very\r\n",
            "   long\r\n",
            "\tsubject line\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8"
        );

        let headers = Headers::parse(block);
        assert_eq!(headers.get("Subject"), Some("a very long subject line"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_last_occurrence_wins() {
        let headers = Headers::parse("Subject: first\r\nX-A: 1\r\nsubject: second");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Subject"), Some("second"));
    }

    #[test]
    fn test_line_without_colon_is_dropped() {
        let headers = Headers::parse("Subject: ok\r\ngarbage line\r\nTo: bob@example.com");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Subject"), Some("ok"));
        assert_eq!(headers.get("To"), Some("bob@example.com"));
    }

    #[test]
    fn test_malformed_line_ends_previous_header() {
        // A dropped line still terminates the header before it, so a
        // following continuation has nothing to attach to.
        let headers = Headers::parse("Subject: ok\r\ngarbage\r\n continued");
        assert_eq!(headers.get("Subject"), Some("ok"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_leading_continuation_is_ignored() {
        let headers = Headers::parse(" orphan\r\nSubject: Hi");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Subject"), Some("Hi"));
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let headers = Headers::parse("Subject: Hi\r\n\r\nTo: bob@example.com\r\n");
        assert_eq!(headers.get("Subject"), Some("Hi"));
        assert_eq!(headers.get("To"), Some("bob@example.com"));
    }

    #[test]
    fn test_value_may_contain_colons() {
        let headers = Headers::parse("Date: Mon, 1 Jan 2024 10:00:00 +0000");
        assert_eq!(headers.get("Date"), Some("Mon, 1 Jan 2024 10:00:00 +0000"));
    }

    #[test]
    fn test_empty_value() {
        let headers = Headers::parse("Attachments:\r\nSubject: x");
        assert_eq!(headers.get("Attachments"), Some(""));
    }

    #[test]
    fn test_empty_block() {
        assert!(Headers::parse("").is_empty());
    }

    #[test]
    fn test_display_sorted() {
        let headers = Headers::parse("To: bob@example.com\r\nFrom: alice@example.com");
        assert_eq!(
            headers.to_string(),
            "From: alice@example.com\r\nTo: bob@example.com\r\n"
        );
    }

    fn header_line() -> impl Strategy<Value = (String, String, Vec<String>)> {
        (
            prop::sample::select(vec!["Subject", "To", "From", "X-Trace", "Attachments"]),
            "[a-zA-Z0-9@.<>=;/]{1,12}",
            prop::collection::vec("[a-zA-Z0-9@.=;]{1,8}", 0..3),
        )
            .prop_map(|(name, value, folds)| (name.to_string(), value, folds))
    }

    proptest! {
        #[test]
        fn well_formed_blocks_fold_and_keep_last(
            lines in prop::collection::vec(header_line(), 1..12)
        ) {
            let mut block = Vec::new();
            let mut expected: HashMap<String, String> = HashMap::new();

            for (name, value, folds) in &lines {
                block.push(format!("{name}: {value}"));
                let mut unfolded = value.clone();
                for fold in folds {
                    block.push(format!("\t {fold}"));
                    unfolded.push(' ');
                    unfolded.push_str(fold);
                }
                expected.insert(name.clone(), unfolded);
            }

            let headers = Headers::parse(&block.join("\r\n"));

            prop_assert_eq!(headers.len(), expected.len());
            for (name, value) in &expected {
                prop_assert_eq!(headers.get(name), Some(value.as_str()));
            }
        }
    }
}
