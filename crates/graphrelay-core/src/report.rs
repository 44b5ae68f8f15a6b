//! Delivery outcome reporting.
//!
//! Every send attempt produces exactly one line on the [`DELIVERY_TARGET`]
//! tracing target:
//!
//! ```text
//! from=<alice@example.com>, host=graph.microsoft.com, msgid=NA, mailer=GraphRelay, tls=on, recipients=bob@example.com,carol@example.com
//! from=<alice@example.com>, host=graph.microsoft.com, msgid=NA, errormsg="send timed out after 30s"
//! ```

use std::fmt;

use tracing::{error, info};

/// Tracing target for delivery records and attachment warnings.
pub const DELIVERY_TARGET: &str = "graphrelay::delivery";

/// Host label written in every record.
pub const HOST_LABEL: &str = "graph.microsoft.com";

/// Relay agent name written in success records.
pub const MAILER_NAME: &str = "GraphRelay";

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The API accepted the message.
    Delivered {
        /// Recipients in envelope order.
        recipients: Vec<String>,
    },
    /// The send failed.
    Failed {
        /// Error detail.
        error: String,
    },
}

/// One delivery log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Mailbox the message was sent as.
    pub identity: String,
    /// What happened.
    pub outcome: DeliveryOutcome,
}

impl DeliveryRecord {
    /// Record for an accepted message.
    #[must_use]
    pub fn delivered(identity: impl Into<String>, recipients: &[String]) -> Self {
        Self {
            identity: identity.into(),
            outcome: DeliveryOutcome::Delivered {
                recipients: recipients.to_vec(),
            },
        }
    }

    /// Record for a failed send.
    #[must_use]
    pub fn failed(identity: impl Into<String>, error: &impl fmt::Display) -> Self {
        Self {
            identity: identity.into(),
            outcome: DeliveryOutcome::Failed {
                error: error.to_string(),
            },
        }
    }

    /// Returns true for a successful delivery.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

impl fmt::Display for DeliveryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from=<{}>, host={HOST_LABEL}, msgid=NA, ", self.identity)?;
        match &self.outcome {
            DeliveryOutcome::Delivered { recipients } => write!(
                f,
                "mailer={MAILER_NAME}, tls=on, recipients={}",
                recipients.join(",")
            ),
            DeliveryOutcome::Failed { error } => write!(f, "errormsg=\"{error}\""),
        }
    }
}

/// Writes delivery records to the delivery log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryReporter;

impl DeliveryReporter {
    /// Emits one record: `info` for deliveries, `error` for failures.
    pub fn report(self, record: &DeliveryRecord) {
        if record.is_delivered() {
            info!(target: DELIVERY_TARGET, "{record}");
        } else {
            error!(target: DELIVERY_TARGET, "{record}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod capture {
    //! In-memory tracing output for tests.

    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    pub struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Capture {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        /// Subscriber writing into this buffer. With `metadata` each line
        /// starts with the level and target, otherwise only the message is
        /// written.
        pub fn subscriber(
            &self,
            metadata: bool,
        ) -> impl tracing::Subscriber + Send + Sync + 'static {
            tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_target(metadata)
                .with_level(metadata)
                .without_time()
                .with_ansi(false)
                .finish()
        }
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
    use super::capture::Capture;
    use super::*;

    fn capture<F: FnOnce()>(f: F) -> String {
        let writer = Capture::default();
        tracing::subscriber::with_default(writer.subscriber(false), f);
        writer.contents()
    }

    fn recipients() -> Vec<String> {
        vec!["bob@example.com".to_string(), "carol@example.com".to_string()]
    }

    #[test]
    fn test_delivered_format() {
        let record = DeliveryRecord::delivered("alice@example.com", &recipients());
        assert_eq!(
            record.to_string(),
            "from=<alice@example.com>, host=graph.microsoft.com, msgid=NA, mailer=GraphRelay, tls=on, recipients=bob@example.com,carol@example.com"
        );
    }

    #[test]
    fn test_failed_format() {
        let record = DeliveryRecord::failed("alice@example.com", &"ErrorInvalidUser: unknown");
        assert_eq!(
            record.to_string(),
            "from=<alice@example.com>, host=graph.microsoft.com, msgid=NA, errormsg=\"ErrorInvalidUser: unknown\""
        );
        assert!(!record.is_delivered());
    }

    #[test]
    fn test_delivered_without_recipients() {
        let record = DeliveryRecord::delivered("alice@example.com", &[]);
        assert!(record.to_string().ends_with("recipients="));
    }

    #[test]
    fn test_reporter_emits_one_line() {
        let output = capture(|| {
            DeliveryReporter.report(&DeliveryRecord::delivered("alice@example.com", &recipients()));
        });

        assert_eq!(output.lines().count(), 1);
        assert_eq!(
            output.trim(),
            "from=<alice@example.com>, host=graph.microsoft.com, msgid=NA, mailer=GraphRelay, tls=on, recipients=bob@example.com,carol@example.com"
        );
    }

    #[test]
    fn test_reporter_failure_line() {
        let output = capture(|| {
            DeliveryReporter.report(&DeliveryRecord::failed("alice@example.com", &"boom"));
        });

        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("errormsg=\"boom\""));
    }
}
