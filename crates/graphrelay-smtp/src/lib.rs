//! # graphrelay-smtp
//!
//! An async SMTP submission listener (RFC 5321) that hands every protocol
//! step to a pluggable session backend.
//!
//! ## Features
//!
//! - **Backend traits**: implement [`Backend`] and [`Session`] to receive
//!   authentication, envelope and message events
//! - **Commands**: HELO, EHLO, AUTH (PLAIN, LOGIN), MAIL FROM, RCPT TO, DATA,
//!   RSET, NOOP, VRFY, QUIT
//! - **Limits**: per-line read timeout, write timeout, maximum message size
//!   and maximum recipients per message
//! - **Extensions**: PIPELINING, 8BITMIME, SIZE, AUTH
//!
//! TLS is not terminated here; `STARTTLS` is answered with 502.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphrelay_smtp::{Backend, Rejection, Server, ServerConfig, Session};
//!
//! struct Sink;
//! struct SinkSession;
//!
//! impl Backend for Sink {
//!     type Session = SinkSession;
//!     fn new_session(&self, _peer: Option<std::net::SocketAddr>) -> SinkSession {
//!         SinkSession
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl Session for SinkSession {
//!     fn auth_plain(&mut self, _: &str, _: &str) -> Result<(), Rejection> { Ok(()) }
//!     fn mail(&mut self, _: &str) -> Result<(), Rejection> { Ok(()) }
//!     fn rcpt(&mut self, _: &str) -> Result<(), Rejection> { Ok(()) }
//!     async fn data(&mut self, _: Vec<u8>) -> Result<(), Rejection> { Ok(()) }
//!     fn reset(&mut self) {}
//!     fn logout(&mut self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> graphrelay_smtp::Result<()> {
//!     let server = Server::new(Arc::new(Sink), ServerConfig::new("relay.example.com"));
//!     server.listen_and_serve("127.0.0.1:2525").await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL payload decoding
//! - [`command`]: SMTP command parser
//! - [`connection`]: Per-connection protocol driver and TCP server
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
mod backend;
pub mod command;
pub mod connection;
mod error;
pub mod types;

pub use backend::{Backend, Session};
pub use command::Command;
pub use connection::{Connection, Server, ServerConfig};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Rejection, Reply, ReplyCode};
