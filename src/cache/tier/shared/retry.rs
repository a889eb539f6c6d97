//! Retry policy shared by every shared-tier call path
//!
//! One policy object owns backoff behavior for all network calls: bounded
//! attempt count, exponential delay growth, and bounded jitter. Errors
//! classified non-retryable fail immediately without consuming the budget.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::config::RetryConfig;
use crate::cache::error::CacheError;

/// Exponential backoff with bounded jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Backoff before the retry following failed attempt number `attempt` (0-based)
    ///
    /// `base * multiplier^attempt`, capped at the maximum, then scaled by a
    /// jitter factor in `[1 - jitter_ratio, 1 + jitter_ratio)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped * self.jitter_factor())
    }

    fn jitter_factor(&self) -> f64 {
        if self.jitter_ratio == 0.0 {
            return 1.0;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let unit = (nanos % 1000) as f64 / 1000.0;
        1.0 + self.jitter_ratio * (unit - 0.5) * 2.0
    }

    /// Run an operation under this policy
    ///
    /// Retries only while the error is classified retryable and attempts
    /// remain; the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::debug!(
                        "{} failed ({}), retrying attempt {} after {:?}",
                        label,
                        e,
                        attempt + 2,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, jitter_ratio: f64) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 8,
            jitter_ratio,
        })
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let p = policy(5, 0.0);
        assert_eq!(p.delay_for(0), Duration::from_millis(1));
        assert_eq!(p.delay_for(1), Duration::from_millis(2));
        assert_eq!(p.delay_for(2), Duration::from_millis(4));
        assert_eq!(p.delay_for(3), Duration::from_millis(8));
        assert_eq!(p.delay_for(10), Duration::from_millis(8), "capped at max");
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let p = policy(5, 0.5);
        for attempt in 0..4 {
            let delay = p.delay_for(attempt).as_secs_f64();
            let nominal = (0.001 * 2.0f64.powi(attempt as i32)).min(0.008);
            assert!(delay >= nominal * 0.5 && delay < nominal * 1.5);
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let p = policy(4, 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<u32, CacheError> = p
            .run("test op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CacheError::connection("transient"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempt_budget_is_bounded() {
        let p = policy(3, 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), CacheError> = p
            .run("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CacheError::timeout("still down")) }
            })
            .await;
        assert!(matches!(result, Err(CacheError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let p = policy(5, 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), CacheError> = p
            .run("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CacheError::protocol("NOAUTH")) }
            })
            .await;
        assert!(matches!(result, Err(CacheError::Protocol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
