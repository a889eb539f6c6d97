//! Bounded connection pool for the shared tier
//!
//! Fixed min/max sizing: the pool is warmed to its minimum at startup and
//! grows lazily to the maximum. Checkout waits are bounded by their own
//! timeout, distinct from request timeouts, so a starved pool fails fast with
//! `PoolExhausted` instead of stalling callers. Connections marked broken are
//! discarded on return rather than reused mid-reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::transport::{SharedConnection, SharedConnector};
use crate::cache::config::SharedTierConfig;
use crate::cache::error::CacheError;

struct PoolInner {
    connector: Arc<dyn SharedConnector>,
    idle: std::sync::Mutex<Vec<Box<dyn SharedConnection>>>,
    permits: Arc<Semaphore>,
    live: AtomicUsize,
    min_size: usize,
    connect_timeout: Duration,
    checkout_timeout: Duration,
}

/// Pool of shared-store connections
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("live", &self.live_count())
            .field("idle", &self.idle_count())
            .field("min_size", &self.inner.min_size)
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn SharedConnector>, config: &SharedTierConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                idle: std::sync::Mutex::new(Vec::with_capacity(config.pool_max_size)),
                permits: Arc::new(Semaphore::new(config.pool_max_size)),
                live: AtomicUsize::new(0),
                min_size: config.pool_min_size,
                connect_timeout: config.connect_timeout(),
                checkout_timeout: config.checkout_timeout(),
            }),
        }
    }

    /// Pre-establish the minimum connection count; failures are logged, not fatal
    pub async fn warm_up(&self) {
        while self.inner.live.load(Ordering::Relaxed) < self.inner.min_size {
            match self.inner.connector.connect(self.inner.connect_timeout).await {
                Ok(conn) => {
                    self.inner.live.fetch_add(1, Ordering::Relaxed);
                    if let Ok(mut idle) = self.inner.idle.lock() {
                        idle.push(conn);
                    }
                }
                Err(e) => {
                    log::debug!("pool warm-up stopped early: {}", e);
                    break;
                }
            }
        }
    }

    /// Acquire a connection, waiting at most the checkout timeout
    pub async fn checkout(&self) -> Result<PooledConnection, CacheError> {
        let permit = match tokio::time::timeout(
            self.inner.checkout_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(CacheError::ShuttingDown),
            Err(_) => return Err(CacheError::PoolExhausted),
        };

        let reused = self.inner.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = self.inner.connector.connect(self.inner.connect_timeout).await?;
                self.inner.live.fetch_add(1, Ordering::Relaxed);
                conn
            }
        };

        Ok(PooledConnection {
            inner: self.inner.clone(),
            conn: Some(conn),
            broken: false,
            _permit: permit,
        })
    }

    /// Close the pool: new checkouts fail and idle connections are dropped
    pub fn close(&self) {
        self.inner.permits.close();
        if let Ok(mut idle) = self.inner.idle.lock() {
            let drained = idle.len();
            idle.clear();
            self.inner.live.fetch_sub(drained, Ordering::Relaxed);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }
}

/// Checked-out connection; returns to the pool on drop unless marked broken
pub struct PooledConnection {
    inner: Arc<PoolInner>,
    conn: Option<Box<dyn SharedConnection>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The underlying connection; present until drop by construction
    pub fn connection(&mut self) -> &mut dyn SharedConnection {
        match self.conn.as_deref_mut() {
            Some(conn) => conn,
            None => unreachable!("pooled connection taken before drop"),
        }
    }

    /// Discard this connection on return instead of reusing it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .field("has_conn", &self.conn.is_some())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                self.inner.live.fetch_sub(1, Ordering::Relaxed);
            } else if let Ok(mut idle) = self.inner.idle.lock() {
                idle.push(conn);
            } else {
                self.inner.live.fetch_sub(1, Ordering::Relaxed);
            }
        }
        // The permit releases on drop, waking the next waiter
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::{MockConnector, MockStore};
    use super::*;

    fn config(min: usize, max: usize, checkout_ms: u64) -> SharedTierConfig {
        SharedTierConfig {
            pool_min_size: min,
            pool_max_size: max,
            checkout_timeout_ms: checkout_ms,
            ..SharedTierConfig::default()
        }
    }

    #[tokio::test]
    async fn warm_up_creates_min_connections() {
        let store = MockStore::shared();
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store.clone())), &config(3, 8, 100));
        pool.warm_up().await;
        assert_eq!(pool.live_count(), 3);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(store.connect_count(), 3);
    }

    #[tokio::test]
    async fn checkout_reuses_idle_connections() {
        let store = MockStore::shared();
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store.clone())), &config(1, 4, 100));
        pool.warm_up().await;

        {
            let mut conn = pool.checkout().await.unwrap();
            conn.connection().ping().await.unwrap();
        }
        {
            let mut conn = pool.checkout().await.unwrap();
            conn.connection().ping().await.unwrap();
        }
        assert_eq!(store.connect_count(), 1, "same connection served both checkouts");
    }

    #[tokio::test]
    async fn exhausted_pool_fails_fast_with_pool_exhausted() {
        let store = MockStore::shared();
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store)), &config(1, 1, 20));
        let held = pool.checkout().await.unwrap();

        let err = pool.checkout().await.unwrap_err();
        assert_eq!(err, CacheError::PoolExhausted);
        drop(held);

        // Capacity freed: the next checkout succeeds
        assert!(pool.checkout().await.is_ok());
    }

    #[tokio::test]
    async fn broken_connections_are_not_reused() {
        let store = MockStore::shared();
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store.clone())), &config(1, 4, 100));

        {
            let mut conn = pool.checkout().await.unwrap();
            conn.mark_broken();
        }
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.live_count(), 0);

        let _ = pool.checkout().await.unwrap();
        assert_eq!(store.connect_count(), 2, "a fresh connection replaced the broken one");
    }

    #[tokio::test]
    async fn connect_failure_surfaces_and_releases_capacity() {
        let store = MockStore::shared();
        store.fail_connects(1);
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store)), &config(1, 1, 50));

        assert!(matches!(
            pool.checkout().await,
            Err(CacheError::Connection(_))
        ));
        // The failed attempt must not leak its permit
        assert!(pool.checkout().await.is_ok());
    }

    #[tokio::test]
    async fn closed_pool_rejects_checkouts() {
        let store = MockStore::shared();
        let pool = ConnectionPool::new(Arc::new(MockConnector::new(store)), &config(1, 2, 50));
        pool.warm_up().await;
        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(
            pool.checkout().await,
            Err(CacheError::ShuttingDown)
        ));
    }
}
