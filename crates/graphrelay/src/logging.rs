//! Tracing setup.
//!
//! Everything goes to stdout. Delivery records additionally go, unadorned,
//! to the configured log file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use graphrelay_core::{Config, DELIVERY_TARGET};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber.
///
/// The returned guard flushes the delivery log when dropped and must be
/// held until shutdown.
pub fn init(config: &Config) -> anyhow::Result<WorkerGuard> {
    let (directory, file_name) = split_log_path(&config.log_file)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(&directory)
        .with_context(|| format!("failed to open log file in {}", directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let delivery_writer = writer.with_filter(|metadata| metadata.target() == DELIVERY_TARGET);

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level)?)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(delivery_writer)
                .with_ansi(false)
                .with_level(false)
                .with_target(false)
                .without_time(),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` if set, else the configured level. Delivery records are
/// always enabled.
fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log_level {level:?}"))?,
    };
    let directive = format!("{DELIVERY_TARGET}=info")
        .parse::<Directive>()
        .context("invalid delivery log directive")?;
    Ok(filter.add_directive(directive))
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("log_file {} has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, file_name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_absolute_path() {
        let (directory, file_name) = split_log_path(Path::new("/var/log/graphrelay.log")).unwrap();
        assert_eq!(directory, PathBuf::from("/var/log"));
        assert_eq!(file_name, "graphrelay.log");
    }

    #[test]
    fn test_split_bare_file_name() {
        let (directory, file_name) = split_log_path(Path::new("relay.log")).unwrap();
        assert_eq!(directory, PathBuf::from("."));
        assert_eq!(file_name, "relay.log");
    }

    #[test]
    fn test_split_rejects_directory() {
        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_env_filter_accepts_level() {
        assert!(env_filter("debug").is_ok());
    }
}
