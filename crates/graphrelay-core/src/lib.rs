//! # graphrelay-core
//!
//! Relay pipeline from SMTP submissions to Microsoft Graph `sendMail`.
//!
//! This crate provides:
//! - Configuration loading (YAML file plus `GRAPHRELAY_*` overrides)
//! - Per-connection relay sessions implementing the SMTP backend
//! - Translation of submitted messages into outbound send requests
//! - The Graph client that performs the send with an app-only token
//! - Delivery records written to a dedicated log target
//!
//! ## Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphrelay_core::{GraphClient, Relay};
//! use graphrelay_oauth::{OAuthClient, Provider, TokenCache};
//! use graphrelay_smtp::{Server, ServerConfig};
//!
//! let provider = Provider::microsoft("tenant-id")?;
//! let oauth = OAuthClient::new("client-id", provider).with_client_secret("secret");
//! let graph = GraphClient::new(TokenCache::new(oauth))?;
//! let relay = Relay::new(Arc::new(graph));
//! Server::new(Arc::new(relay), ServerConfig::new("relay.example.com"))
//!     .listen_and_serve("0.0.0.0:2525".parse()?)
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod envelope;
mod error;
pub mod outbound;
pub mod report;
pub mod service;
pub mod session;

pub use config::Config;
pub use envelope::Envelope;
pub use error::{Error, Result, SendError, SessionError};
pub use outbound::{OutboundRequest, Translation, translate};
pub use report::{DELIVERY_TARGET, DeliveryOutcome, DeliveryRecord, DeliveryReporter};
pub use service::{GraphClient, MailSender};
pub use session::{Relay, RelaySession, SessionState};
