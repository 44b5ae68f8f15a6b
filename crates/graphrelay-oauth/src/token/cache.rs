//! Shared token cache.

use super::Token;
use crate::error::Result;
use crate::flow::TokenSource;
use tokio::sync::Mutex;

/// Caches one access token and refetches it from the source once expired.
///
/// Concurrent callers serialize on the cache lock, so an expired token is
/// fetched once rather than once per waiting session.
#[derive(Debug)]
pub struct TokenCache<S> {
    source: S,
    current: Mutex<Option<Token>>,
}

impl<S: TokenSource> TokenCache<S> {
    /// Creates an empty cache over a token source.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: Mutex::new(None),
        }
    }

    /// Returns the token source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Returns a valid token, fetching a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a new token is needed and the source fails.
    pub async fn token(&self) -> Result<Token> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref().filter(|token| token.is_valid()) {
            return Ok(token.clone());
        }

        let token = self.source.fetch_token().await?;
        tracing::debug!(expires_at = ?token.expires_at, "acquired new access token");
        *current = Some(token.clone());
        Ok(token)
    }

    /// Returns a valid access token string.
    ///
    /// # Errors
    ///
    /// Returns an error if a new token is needed and the source fails.
    pub async fn access_token(&self) -> Result<String> {
        self.token().await.map(|token| token.access_token)
    }

    /// Drops the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        lifetime: Duration,
    }

    impl CountingSource {
        fn new(lifetime: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                lifetime,
            }
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<Token> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Token::new(format!("token-{n}"), "Bearer")
                .with_expires_at(Utc::now() + self.lifetime))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn fetch_token(&self) -> Result<Token> {
            Err(Error::oauth_error("invalid_client", "bad secret"))
        }
    }

    #[tokio::test]
    async fn test_reuses_valid_token() {
        let cache = TokenCache::new(CountingSource::new(Duration::hours(1)));

        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_expired_token() {
        // Lifetime inside the expiry buffer: every cached token is stale.
        let cache = TokenCache::new(CountingSource::new(Duration::seconds(10)));

        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.access_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = TokenCache::new(CountingSource::new(Duration::hours(1)));

        cache.access_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.access_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Arc::new(TokenCache::new(CountingSource::new(Duration::hours(1))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.access_token().await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let cache = TokenCache::new(FailingSource);
        assert!(matches!(
            cache.token().await,
            Err(Error::OAuth { .. })
        ));
    }
}
