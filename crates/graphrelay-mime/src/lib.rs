//! # graphrelay-mime
//!
//! Lightweight RFC 5322 message handling for the relay.
//!
//! The relay never needs a full MIME tree: it forwards the body as-is and
//! only looks at a handful of headers. This crate provides exactly that:
//!
//! - **Header parsing**: unfold continuation lines into one value per name
//! - **Message splitting**: separate the header block from the body at the
//!   first blank line
//! - **Body kind**: decide between plain text and HTML from `Content-Type`
//!
//! ## Quick Start
//!
//! ```
//! use graphrelay_mime::{BodyKind, Message};
//!
//! let raw = b"Subject: Hi\r\nContent-Type: text/html\r\n\r\n<p>Hello</p>";
//! let message = Message::parse(raw);
//!
//! assert_eq!(message.subject(), Some("Hi"));
//! assert_eq!(message.body_kind(), BodyKind::Html);
//! assert_eq!(message.body(), b"<p>Hello</p>");
//! ```
//!
//! ## Limitations
//!
//! - A header that appears more than once keeps only its last value.
//! - No transfer decoding or multipart traversal is performed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod header;
mod message;

pub use content_type::BodyKind;
pub use header::Headers;
pub use message::{HEADER_BODY_SEPARATOR, Message};
