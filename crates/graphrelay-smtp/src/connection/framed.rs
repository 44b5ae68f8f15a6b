//! Framed I/O for the SMTP server side.
//!
//! SMTP commands are LF-terminated lines (CRLF on the wire, bare LF tolerated).
//! Message data follows a `DATA` command as lines ending with a lone `.`,
//! with a leading `.` doubled on any line that starts with one.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::types::Reply;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum command line length, including the terminator.
pub const MAX_LINE_LENGTH: usize = 2000;

/// Bytes of the `.` CRLF end-of-data marker.
const END_MARKER_LEN: usize = 3;

/// Framed connection for the SMTP server side.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    read_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            read_timeout: None,
        }
    }

    /// Bounds how long each line may take to arrive.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Reads one command line, without its line terminator.
    ///
    /// An over-long line is consumed to its end and reported as
    /// [`Error::LineTooLong`], leaving the stream at the next line.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        if !self.read_raw_line(&mut line, MAX_LINE_LENGTH).await? {
            return Err(Error::LineTooLong(MAX_LINE_LENGTH));
        }

        let line = line.strip_suffix(b"\n").unwrap_or(&line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Ok(String::from_utf8_lossy(line).into_owned())
    }

    /// Reads message data up to the `.` line, undoing dot-stuffing.
    ///
    /// Line terminators inside the message are kept as sent. If the data
    /// exceeds `max_bytes`, the rest is still consumed up to the end marker
    /// and [`Error::MessageTooLarge`] is returned.
    pub async fn read_data(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let line_limit = max_bytes.saturating_add(END_MARKER_LEN);
        let mut body = Vec::new();
        let mut line = Vec::new();
        let mut overflow = false;

        loop {
            line.clear();
            let complete = self.read_raw_line(&mut line, line_limit).await?;

            if complete && (line == b".\r\n" || line == b".\n") {
                break;
            }

            let content = line.strip_prefix(b".".as_slice()).unwrap_or(line.as_slice());
            if !complete || overflow || body.len() + content.len() > max_bytes {
                overflow = true;
                continue;
            }
            body.extend_from_slice(content);
        }

        if overflow {
            return Err(Error::MessageTooLarge(max_bytes));
        }
        Ok(body)
    }

    /// Reads through the next LF into `line`.
    ///
    /// Returns `false` if the line exceeded `limit`; the excess is discarded.
    async fn read_raw_line(&mut self, line: &mut Vec<u8>, limit: usize) -> Result<bool> {
        match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fill_line(line, limit))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.fill_line(line, limit).await,
        }
    }

    async fn fill_line(&mut self, line: &mut Vec<u8>, limit: usize) -> Result<bool> {
        let mut within_limit = true;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::ConnectionClosed);
            }

            let (chunk, done) = match find_lf(buf) {
                Some(pos) => (&buf[..=pos], true),
                None => (buf, false),
            };
            let consumed = chunk.len();

            if within_limit && line.len() + consumed <= limit {
                line.extend_from_slice(chunk);
            } else {
                within_limit = false;
            }
            self.reader.consume(consumed);

            if done {
                return Ok(within_limit);
            }
        }
    }

    /// Writes a reply and flushes it.
    pub async fn write_reply(&mut self, reply: &Reply) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(&reply.serialize());

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }
}

/// Finds the position of LF in a buffer.
fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
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
    use crate::types::ReplyCode;
    use tokio_test::io::Builder;

    #[test]
    fn test_find_lf() {
        assert_eq!(find_lf(b"hello\r\n"), Some(6));
        assert_eq!(find_lf(b"\n"), Some(0));
        assert_eq!(find_lf(b"no newline"), None);
    }

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let mock = Builder::new().read(b"EHLO client.example.com\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "EHLO client.example.com");
    }

    #[tokio::test]
    async fn test_read_line_bare_lf() {
        let mock = Builder::new().read(b"NOOP\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "NOOP");
    }

    #[tokio::test]
    async fn test_read_line_split_across_reads() {
        let mock = Builder::new().read(b"MAIL FR").read(b"OM:<a@b.c>\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "MAIL FROM:<a@b.c>");
    }

    #[tokio::test]
    async fn test_read_pipelined_lines() {
        let mock = Builder::new()
            .read(b"RCPT TO:<a@example.com>\r\nRCPT TO:<b@example.com>\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "RCPT TO:<a@example.com>");
        assert_eq!(framed.read_line().await.unwrap(), "RCPT TO:<b@example.com>");
    }

    #[tokio::test]
    async fn test_line_length_limit_recovers() {
        let long_line = format!("{}\r\nNOOP\r\n", "A".repeat(MAX_LINE_LENGTH + 100));
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_line().await,
            Err(Error::LineTooLong(MAX_LINE_LENGTH))
        ));
        assert_eq!(framed.read_line().await.unwrap(), "NOOP");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = Builder::new().read(b"QUI").build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_line().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_data_unstuffs_dots() {
        let mock = Builder::new()
            .read(b"Subject: Hi\r\n\r\n..leading dot\r\nplain\r\n.\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let body = framed.read_data(1024).await.unwrap();
        assert_eq!(body, b"Subject: Hi\r\n\r\n.leading dot\r\nplain\r\n");
    }

    #[tokio::test]
    async fn test_read_data_leaves_following_command() {
        let mock = Builder::new().read(b"body\r\n.\r\nQUIT\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_data(1024).await.unwrap(), b"body\r\n");
        assert_eq!(framed.read_line().await.unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn test_read_data_too_large_is_consumed() {
        let data = format!("{}\r\nmore\r\n.\r\nNOOP\r\n", "x".repeat(64));
        let mock = Builder::new().read(data.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_data(16).await,
            Err(Error::MessageTooLarge(16))
        ));
        assert_eq!(framed.read_line().await.unwrap(), "NOOP");
    }

    #[tokio::test]
    async fn test_read_data_eof() {
        let mock = Builder::new().read(b"unterminated\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_data(1024).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (server, _client) = tokio::io::duplex(64);
        let mut framed = FramedStream::new(server).with_read_timeout(Duration::from_secs(10));

        assert!(matches!(framed.read_line().await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_write_reply() {
        let mock = Builder::new().write(b"250 OK\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed
            .write_reply(&Reply::single(ReplyCode::OK, "OK"))
            .await
            .unwrap();
    }
}
