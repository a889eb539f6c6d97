//! Background TTL sweeper for the memory tier
//!
//! Scans for expired entries on a fixed interval, independent of the lazy
//! expiry performed on access. The task is cancellable: shutdown is a signal
//! plus a join, never an orphaned task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::MemoryTier;

/// Handle to a running sweeper task
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn the sweep loop on the current runtime
    pub fn spawn(memory: Arc<MemoryTier>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would sweep an empty cache
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = memory.sweep_expired();
                        if removed > 0 {
                            log::debug!("ttl sweep removed {} expired entries", removed);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        Self { shutdown_tx, task }
    }

    /// Signal the sweep loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Abort without waiting; used when the owner is dropped without shutdown
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::MemoryTierConfig;
    use crate::cache::telemetry::CacheMetrics;
    use crate::cache::traits::{ManualClock, ObserverRegistry};
    use crate::cache::types::{CacheEntry, CompressionAlgorithm};

    fn tier(clock: Arc<ManualClock>) -> Arc<MemoryTier> {
        Arc::new(MemoryTier::new(
            &MemoryTierConfig::default(),
            clock,
            Arc::new(CacheMetrics::new()),
            Arc::new(ObserverRegistry::new()),
        ))
    }

    fn entry(ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(
            b"v".to_vec(),
            1,
            CompressionAlgorithm::None,
            Duration::from_secs(ttl_secs),
            0,
            vec![],
            vec![],
        )
    }

    #[tokio::test]
    async fn sweeper_removes_expired_entries_without_access() {
        let clock = ManualClock::starting_at(0);
        let memory = tier(clock.clone());
        memory.insert("dead", entry(1));
        memory.insert("alive", entry(600));

        clock.set_millis(5_000);
        let handle = SweeperHandle::spawn(memory.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!memory.contains_valid("dead"));
        assert_eq!(memory.len(), 1, "expired entry removed without a get");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let clock = ManualClock::starting_at(0);
        let memory = tier(clock);
        let handle = SweeperHandle::spawn(memory, Duration::from_millis(10));
        // Returns only after the task observed the signal and exited
        handle.shutdown().await;
    }
}
