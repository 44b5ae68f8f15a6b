//! # graphrelay-oauth
//!
//! `OAuth2` token acquisition for the relay's outbound API calls.
//!
//! ## Features
//!
//! - **Client credentials flow**: application (daemon) tokens, no user
//!   interaction
//! - **Token management**: expiration checking with a safety buffer
//! - **Token cache**: one shared token reused across sessions until it expires
//! - **Provider configuration**: Microsoft identity platform per tenant
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_oauth::{OAuthClient, Provider, TokenCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Provider::microsoft("your-tenant-id")?;
//!     let client = OAuthClient::new("your_client_id", provider)
//!         .with_client_secret("your_secret");
//!
//!     let cache = TokenCache::new(client);
//!     let token = cache.access_token().await?;
//!     println!("Authorization: Bearer {token}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{OAuthClient, TokenSource};
pub use provider::Provider;
pub use token::{Token, TokenCache};
