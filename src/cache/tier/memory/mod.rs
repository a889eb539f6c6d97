//! Memory tier (L1): bounded in-process store with scored eviction
//!
//! Storage is a sharded concurrent map, so operations on distinct keys do not
//! serialize against each other while same-key operations linearize under the
//! shard lock. TTL expiry is checked lazily on access; a background sweeper
//! (see `sweeper`) removes expired entries proactively.

pub mod eviction;
pub mod sweeper;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use dashmap::DashMap;

use crate::cache::config::MemoryTierConfig;
use crate::cache::telemetry::CacheMetrics;
use crate::cache::traits::{CacheEvent, Clock, ObserverRegistry};
use crate::cache::types::{CacheEntry, EvictionCause};

use self::eviction::EvictionWeights;

/// Bounded in-process cache tier
#[derive(Debug)]
pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
    bytes_used: CachePadded<AtomicU64>,
    max_entries: usize,
    max_bytes: u64,
    weights: EvictionWeights,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    observers: Arc<ObserverRegistry>,
}

impl MemoryTier {
    pub fn new(
        config: &MemoryTierConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            bytes_used: CachePadded::new(AtomicU64::new(0)),
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
            weights: config.eviction,
            clock,
            metrics,
            observers,
        }
    }

    /// Look up an entry, updating its access metadata on a hit
    ///
    /// An expired entry is lazily removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.epoch_millis();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                entry.metadata.touch(now);
                return Some(entry.clone());
            }
        }
        // Expired: remove outside the read guard
        self.remove_if_expired(key, now);
        None
    }

    /// Access count of a resident, unexpired entry without touching it
    pub fn peek_access_count(&self, key: &str) -> u64 {
        let now = self.clock.epoch_millis();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.metadata.access_count())
            .unwrap_or(0)
    }

    /// Whether an unexpired entry is resident
    pub fn contains_valid(&self, key: &str) -> bool {
        let now = self.clock.epoch_millis();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Insert or overwrite, evicting first if capacity would be exceeded
    ///
    /// Returns false when the entry can never fit; the caller still owns the
    /// shared-tier write in that case.
    pub fn insert(&self, key: &str, entry: CacheEntry) -> bool {
        let cost = entry.cost_bytes(key) as u64;
        if cost > self.max_bytes {
            log::debug!(
                "entry for '{}' ({} bytes) exceeds memory tier capacity, bypassing",
                key,
                cost
            );
            self.metrics.record_oversize_rejection();
            return false;
        }

        self.ensure_capacity(key, cost);
        let old = self.entries.insert(key.to_string(), entry);
        self.bytes_used.fetch_add(cost, Ordering::Relaxed);
        if let Some(old_entry) = old {
            self.bytes_used
                .fetch_sub(old_entry.cost_bytes(key) as u64, Ordering::Relaxed);
        }
        true
    }

    /// Remove an entry unconditionally; absent keys are a no-op
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let (key, entry) = self.entries.remove(key)?;
        self.bytes_used
            .fetch_sub(entry.cost_bytes(&key) as u64, Ordering::Relaxed);
        Some(entry)
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
        self.bytes_used.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Relaxed)
    }

    /// Resident keys matching a glob pattern
    pub fn keys_matching(&self, pattern: &glob::Pattern) -> Vec<String> {
        self.entries
            .iter()
            .filter(|r| pattern.matches(r.key()))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Retention score of a resident entry, for capacity tests and debugging
    pub fn score_of(&self, key: &str) -> Option<f64> {
        let now = self.clock.epoch_millis();
        self.entries
            .get(key)
            .map(|entry| self.weights.score(&entry, now))
    }

    /// Remove every expired entry; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.epoch_millis();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.remove_if_expired(&key, now) {
                removed += 1;
            }
        }
        removed
    }

    /// Evict lowest-scored entries until the incoming entry fits
    fn ensure_capacity(&self, incoming_key: &str, incoming_cost: u64) {
        let now = self.clock.epoch_millis();
        let replaced_cost = self
            .entries
            .get(incoming_key)
            .map(|e| e.cost_bytes(incoming_key) as u64)
            .unwrap_or(0);

        loop {
            let len = self.entries.len();
            let over_entries = if replaced_cost > 0 {
                len > self.max_entries
            } else {
                len >= self.max_entries
            };
            let projected = self
                .bytes_used
                .load(Ordering::Relaxed)
                .saturating_sub(replaced_cost)
                .saturating_add(incoming_cost);
            if !over_entries && projected <= self.max_bytes {
                break;
            }

            let mut victim: Option<(String, f64)> = None;
            for r in self.entries.iter() {
                if r.key() == incoming_key {
                    continue;
                }
                let score = self.weights.score(r.value(), now);
                if victim.as_ref().is_none_or(|(_, lowest)| score < *lowest) {
                    victim = Some((r.key().clone(), score));
                }
            }
            let Some((victim_key, _)) = victim else {
                break;
            };
            if self.remove(&victim_key).is_some() {
                self.metrics.record_eviction();
                self.emit_eviction(&victim_key, EvictionCause::Capacity);
            }
        }
    }

    /// Remove a key only if it is still expired; linearizes with writers
    fn remove_if_expired(&self, key: &str, now_ms: u64) -> bool {
        let removed = self.entries.remove_if(key, |_, entry| entry.is_expired(now_ms));
        match removed {
            Some((key, entry)) => {
                self.bytes_used
                    .fetch_sub(entry.cost_bytes(&key) as u64, Ordering::Relaxed);
                self.metrics.record_expired(1);
                self.emit_eviction(&key, EvictionCause::Expired);
                true
            }
            None => false,
        }
    }

    fn emit_eviction(&self, key: &str, cause: EvictionCause) {
        if self.observers.is_active() {
            self.observers.emit(&CacheEvent::Evicted {
                key: key.to_string(),
                cause,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::traits::ManualClock;
    use crate::cache::types::CompressionAlgorithm;
    use std::time::Duration;

    fn tier(max_entries: usize, max_bytes: u64, clock: Arc<ManualClock>) -> MemoryTier {
        MemoryTier::new(
            &MemoryTierConfig {
                max_entries,
                max_bytes,
                eviction: EvictionWeights::default(),
            },
            clock,
            Arc::new(CacheMetrics::new()),
            Arc::new(ObserverRegistry::new()),
        )
    }

    fn entry(payload: &[u8], ttl_secs: u64, now_ms: u64) -> CacheEntry {
        CacheEntry::new(
            payload.to_vec(),
            payload.len(),
            CompressionAlgorithm::None,
            Duration::from_secs(ttl_secs),
            now_ms,
            vec![],
            vec![],
        )
    }

    #[test]
    fn insert_then_get_returns_payload() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 1 << 20, clock.clone());
        assert!(t.insert("k", entry(b"value", 60, 0)));
        let got = t.get("k").expect("entry resident");
        assert_eq!(got.payload.as_ref(), b"value");
        assert_eq!(got.metadata.access_count(), 1);
    }

    #[test]
    fn entry_expires_strictly_after_ttl() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 1 << 20, clock.clone());
        t.insert("k", entry(b"value", 10, 0));

        clock.set_millis(9_999);
        assert!(t.get("k").is_some());

        clock.set_millis(10_000);
        assert!(t.get("k").is_none());
        assert_eq!(t.len(), 0, "expired entry lazily removed");
    }

    #[test]
    fn entry_cap_evicts_lowest_scored_first() {
        let clock = ManualClock::starting_at(0);
        let t = tier(2, 1 << 20, clock.clone());
        t.insert("hot", entry(b"a", 600, 0));
        t.insert("cold", entry(b"b", 600, 0));

        // Make "hot" clearly more valuable than "cold"
        clock.set_millis(60_000);
        for _ in 0..50 {
            t.get("hot");
        }
        assert!(t.score_of("hot").unwrap() > t.score_of("cold").unwrap());

        t.insert("new", entry(b"c", 600, 60_000));
        assert_eq!(t.len(), 2);
        assert!(t.contains_valid("hot"));
        assert!(t.contains_valid("new"));
        assert!(!t.contains_valid("cold"));
    }

    #[test]
    fn byte_cap_evicts_until_entry_fits() {
        let clock = ManualClock::starting_at(0);
        let t = tier(1024, 2_400, clock.clone());
        t.insert("a", entry(&[0u8; 600], 600, 0));
        t.insert("b", entry(&[0u8; 600], 600, 0));
        assert_eq!(t.len(), 2);

        t.insert("c", entry(&[0u8; 1_200], 600, 0));
        assert!(t.contains_valid("c"));
        assert!(t.len() < 3, "an older entry was evicted for bytes");
        assert!(t.bytes_used() <= 2_400);
    }

    #[test]
    fn oversized_entry_bypasses_tier() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 512, clock.clone());
        assert!(!t.insert("big", entry(&[0u8; 4096], 600, 0)));
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn replace_updates_byte_accounting() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 1 << 20, clock.clone());
        t.insert("k", entry(&[0u8; 1000], 600, 0));
        let first = t.bytes_used();
        t.insert("k", entry(&[0u8; 10], 600, 0));
        assert!(t.bytes_used() < first);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 1 << 20, clock.clone());
        t.insert("short", entry(b"a", 5, 0));
        t.insert("long", entry(b"b", 600, 0));

        clock.set_millis(10_000);
        assert_eq!(t.sweep_expired(), 1);
        assert!(!t.contains_valid("short"));
        assert!(t.contains_valid("long"));
    }

    #[test]
    fn keys_matching_filters_by_glob() {
        let clock = ManualClock::starting_at(0);
        let t = tier(16, 1 << 20, clock.clone());
        t.insert("product:1", entry(b"a", 600, 0));
        t.insert("product:2", entry(b"b", 600, 0));
        t.insert("customer:1", entry(b"c", 600, 0));

        let pattern = glob::Pattern::new("product:*").unwrap();
        let mut keys = t.keys_matching(&pattern);
        keys.sort();
        assert_eq!(keys, vec!["product:1", "product:2"]);
    }

    #[test]
    fn concurrent_same_key_writes_leave_one_value() {
        let clock = ManualClock::starting_at(0);
        let t = Arc::new(tier(16, 1 << 20, clock.clone()));

        let writers: Vec<_> = [b"one".as_slice(), b"two".as_slice()]
            .into_iter()
            .map(|value| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        t.insert("k", entry(value, 600, 0));
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let got = t.get("k").expect("entry resident");
        assert!(
            got.payload.as_ref() == b"one" || got.payload.as_ref() == b"two",
            "payload must be one of the written values, never torn"
        );
    }
}
