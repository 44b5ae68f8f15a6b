//! `GraphRelay` - SMTP to Microsoft Graph relay
//!
//! Accepts mail over SMTP and delivers every message through the Graph
//! `sendMail` API using an app-only token.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use graphrelay_core::{Config, GraphClient, Relay};
use graphrelay_oauth::{OAuthClient, Provider, TokenCache};
use graphrelay_smtp::{Server, ServerConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "graphrelay", version, about)]
struct Args {
    /// Path of the YAML configuration file.
    #[arg(short, long, env = "GRAPHRELAY_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;

    if args.check {
        println!("{}: configuration OK", args.config.display());
        return Ok(());
    }

    let _guard = logging::init(&config)?;
    info!(config = %args.config.display(), "Starting GraphRelay");

    let relay = build_relay(&config)?;
    let addr = config.smtp.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    Server::new(Arc::new(relay), ServerConfig::from(&config.smtp))
        .serve_with_shutdown(listener, shutdown_signal())
        .await?;

    info!("GraphRelay stopped");
    Ok(())
}

fn build_relay(config: &Config) -> anyhow::Result<Relay> {
    let azure = &config.azure;
    let provider = Provider::microsoft(&azure.tenant_id).context("invalid tenant")?;
    let oauth = OAuthClient::new(azure.client_id.as_str(), provider)
        .with_client_secret(azure.client_secret.as_str());
    oauth.validate().context("invalid Azure credentials")?;

    let graph = GraphClient::new(TokenCache::new(oauth))?;
    Ok(Relay::new(Arc::new(graph)).with_send_timeout(config.relay.send_timeout()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
