//! Outbound delivery services.
//!
//! [`MailSender`] is the seam between relay sessions and the delivery API;
//! [`GraphClient`] is the production implementation.

pub mod graph;
mod sender;

pub use graph::GraphClient;
pub use sender::MailSender;
