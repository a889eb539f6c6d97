//! Shared tier (L2): pooled client over an external key-value store
//!
//! Thin client composing the connection pool, the retry policy, and the
//! circuit breaker. Every call is bounded by explicit timeouts; a starved
//! pool fails fast with `PoolExhausted` and an open circuit short-circuits
//! without touching the network.

pub mod breaker;
#[cfg(test)]
pub(crate) mod mock;
pub mod pool;
pub mod resp;
pub mod retry;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::config::SharedTierConfig;
use crate::cache::error::CacheError;
use crate::cache::telemetry::CacheMetrics;
use crate::cache::traits::{CacheEvent, Clock, ObserverRegistry};
use crate::cache::types::L2LinkState;

use self::breaker::{LinkBreaker, LinkDecision};
use self::pool::{ConnectionPool, PooledConnection};
use self::retry::RetryPolicy;
use self::transport::SharedConnector;

/// Client for the out-of-process shared store
#[derive(Debug)]
pub struct SharedTierClient {
    pool: ConnectionPool,
    retry: RetryPolicy,
    breaker: LinkBreaker,
    key_prefix: String,
    read_timeout: Duration,
    metrics: Arc<CacheMetrics>,
    observers: Arc<ObserverRegistry>,
}

impl SharedTierClient {
    pub fn new(
        connector: Arc<dyn SharedConnector>,
        config: &SharedTierConfig,
        key_prefix: String,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(connector, config),
            retry: RetryPolicy::new(&config.retry),
            breaker: LinkBreaker::new(
                config.circuit_failure_threshold,
                config.circuit_cooldown(),
                clock,
            ),
            key_prefix,
            read_timeout: config.read_timeout(),
            metrics,
            observers,
        }
    }

    /// Pre-establish the minimum pool size; best-effort
    pub async fn warm_up(&self) {
        self.pool.warm_up().await;
    }

    /// Stop handing out connections and drop the idle set
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn link_state(&self) -> L2LinkState {
        self.breaker.state()
    }

    /// Fetch stored bytes for a key
    ///
    /// With a deadline the call makes a single attempt bounded by the
    /// remaining budget; without one the shared retry policy applies.
    pub async fn get(
        &self,
        key: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        // A spent budget is the caller's condition, not a link failure
        if let Some(deadline) = deadline
            && deadline <= Instant::now()
        {
            self.metrics.record_l2_read_failure();
            return Err(CacheError::timeout("deadline elapsed before shared get"));
        }
        self.pre_flight().await?;
        let full = self.full_key(key);
        let result = if deadline.is_some() {
            self.attempt_get(&full, deadline).await
        } else {
            self.retry
                .run("shared get", || self.attempt_get(&full, None))
                .await
        };
        if result.is_err() {
            self.metrics.record_l2_read_failure();
        }
        self.settle("get", result)
    }

    /// Store bytes under a key with the given TTL
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.pre_flight().await?;
        let full = self.full_key(key);
        let result = self
            .retry
            .run("shared set", || self.attempt_set(&full, value, ttl))
            .await;
        if result.is_err() {
            self.metrics.record_l2_write_failure();
        }
        self.settle("set", result)
    }

    /// Delete a single key
    pub async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let keys = [key.to_string()];
        self.delete_many(&keys).await
    }

    /// Delete a batch of keys in one round trip
    pub async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.pre_flight().await?;
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let result = self
            .retry
            .run("shared delete", || self.attempt_delete(&full))
            .await;
        if result.is_err() {
            self.metrics.record_l2_write_failure();
        }
        self.settle("delete", result)
    }

    fn full_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.key_prefix, key)
        }
    }

    /// Gate an operation on the circuit breaker, probing when it is our turn
    async fn pre_flight(&self) -> Result<(), CacheError> {
        match self.breaker.decide() {
            LinkDecision::Attempt => Ok(()),
            LinkDecision::ShortCircuit => {
                self.metrics.record_l2_short_circuit();
                Err(CacheError::CircuitOpen)
            }
            LinkDecision::Probe => self.run_probe().await,
        }
    }

    /// Single health probe after cooldown; resolves the half-open state
    async fn run_probe(&self) -> Result<(), CacheError> {
        match self.attempt_ping().await {
            Ok(()) => {
                log::info!("shared tier probe succeeded, link restored");
                self.note_state(self.breaker.record_success());
                Ok(())
            }
            Err(e) => {
                if e.counts_against_circuit() {
                    log::warn!("shared tier probe failed: {}", e);
                    self.note_state(self.breaker.record_failure());
                } else {
                    // The probe never reached the store; free the slot
                    self.breaker.cancel_probe();
                }
                Err(e)
            }
        }
    }

    async fn attempt_get(
        &self,
        full_key: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(window) = effective_timeout(self.read_timeout, deadline) else {
            return Err(CacheError::timeout("deadline elapsed before shared get"));
        };
        let mut pooled = self.pool.checkout().await?;
        let outcome = tokio::time::timeout(window, pooled.connection().get(full_key)).await;
        unwrap_network(outcome, &mut pooled, "shared get")
    }

    async fn attempt_set(
        &self,
        full_key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut pooled = self.pool.checkout().await?;
        let outcome =
            tokio::time::timeout(self.read_timeout, pooled.connection().set(full_key, value, ttl))
                .await;
        unwrap_network(outcome, &mut pooled, "shared set")
    }

    async fn attempt_delete(&self, full_keys: &[String]) -> Result<u64, CacheError> {
        let mut pooled = self.pool.checkout().await?;
        let outcome =
            tokio::time::timeout(self.read_timeout, pooled.connection().delete(full_keys)).await;
        unwrap_network(outcome, &mut pooled, "shared delete")
    }

    async fn attempt_ping(&self) -> Result<(), CacheError> {
        let mut pooled = self.pool.checkout().await?;
        let outcome = tokio::time::timeout(self.read_timeout, pooled.connection().ping()).await;
        unwrap_network(outcome, &mut pooled, "shared ping")
    }

    /// Feed the final call outcome into the breaker
    fn settle<T>(&self, op: &str, result: Result<T, CacheError>) -> Result<T, CacheError> {
        match &result {
            Ok(_) => self.note_state(self.breaker.record_success()),
            Err(e) if e.counts_against_circuit() => {
                log::debug!("shared tier {} failed: {}", op, e);
                self.note_state(self.breaker.record_failure());
            }
            Err(e) => log::debug!("shared tier {} unavailable: {}", op, e),
        }
        result
    }

    fn note_state(&self, changed: Option<L2LinkState>) {
        if let Some(state) = changed {
            log::warn!("shared tier link is now {}", state);
            if self.observers.is_active() {
                self.observers.emit(&CacheEvent::LinkStateChanged { state });
            }
        }
    }
}

/// Remaining wait for one network exchange, or `None` when the deadline passed
fn effective_timeout(read_timeout: Duration, deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        None => Some(read_timeout),
        Some(deadline) => {
            let now = Instant::now();
            if deadline <= now {
                None
            } else {
                Some(read_timeout.min(deadline - now))
            }
        }
    }
}

/// Collapse a timeout-wrapped network result, breaking the connection on
/// transport failures so it is recycled instead of reused mid-reply
fn unwrap_network<T>(
    outcome: Result<Result<T, CacheError>, tokio::time::error::Elapsed>,
    pooled: &mut PooledConnection,
    label: &str,
) -> Result<T, CacheError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if e.retryable() {
                pooled.mark_broken();
            }
            Err(e)
        }
        Err(_elapsed) => {
            pooled.mark_broken();
            Err(CacheError::timeout(label))
        }
    }
}
