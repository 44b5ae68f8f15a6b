//! TCP listener that runs one task per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use super::ServerConfig;
use super::handler::Connection;
use crate::backend::Backend;
use crate::error::Result;

/// SMTP server bound to a [`Backend`].
pub struct Server<B> {
    backend: Arc<B>,
    config: Arc<ServerConfig>,
}

impl<B: Backend> Server<B> {
    /// Creates a server.
    #[must_use]
    pub fn new(backend: Arc<B>, config: ServerConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds `addr` and serves until the process ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn listen_and_serve(&self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(address = %local, domain = %self.config.domain, "SMTP listener started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(address = %local, "SMTP listener stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn(stream, peer),
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }
    }

    fn spawn(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "accepted connection");
        let session = self.backend.new_session(Some(peer));
        let connection = Connection::new(stream, session, Arc::clone(&self.config)).with_peer(peer);

        tokio::spawn(async move {
            match connection.run().await {
                Ok(()) => debug!(%peer, "connection closed"),
                Err(e) => debug!(%peer, error = %e, "connection ended with error"),
            }
        });
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
    use crate::backend::Session;
    use crate::types::Rejection;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[derive(Default)]
    struct CountingBackend {
        sessions: AtomicUsize,
    }

    struct NullSession;

    impl Backend for CountingBackend {
        type Session = NullSession;

        fn new_session(&self, _peer: Option<SocketAddr>) -> NullSession {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            NullSession
        }
    }

    #[async_trait]
    impl Session for NullSession {
        fn auth_plain(&mut self, _: &str, _: &str) -> std::result::Result<(), Rejection> {
            Ok(())
        }

        fn mail(&mut self, _: &str) -> std::result::Result<(), Rejection> {
            Ok(())
        }

        fn rcpt(&mut self, _: &str) -> std::result::Result<(), Rejection> {
            Ok(())
        }

        async fn data(&mut self, _: Vec<u8>) -> std::result::Result<(), Rejection> {
            Ok(())
        }

        fn reset(&mut self) {}

        fn logout(&mut self) {}
    }

    #[tokio::test]
    async fn test_serves_connections_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let server = Server::new(Arc::clone(&backend), ServerConfig::new("relay.example.com"));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        for _ in 0..2 {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut client = BufReader::new(stream);
            let mut line = String::new();

            client.read_line(&mut line).await.unwrap();
            assert_eq!(line, "220 relay.example.com ESMTP Service Ready\r\n");

            client.get_mut().write_all(b"QUIT\r\n").await.unwrap();
            line.clear();
            client.read_line(&mut line).await.unwrap();
            assert_eq!(line, "221 Bye\r\n");
        }

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(backend.sessions.load(Ordering::SeqCst), 2);
    }
}
