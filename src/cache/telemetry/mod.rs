//! Per-instance cache metrics with atomic coordination
//!
//! Counters are padded atomics updated on the hot path; the snapshot is
//! rebuilt on demand from the live values rather than maintained separately.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::cache::types::L2LinkState;

/// Live counters for a single cache instance
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups served from the memory tier
    l1_hits: CachePadded<AtomicU64>,
    /// Lookups served from the shared tier
    l2_hits: CachePadded<AtomicU64>,
    /// Lookups that missed both tiers
    misses: CachePadded<AtomicU64>,
    /// Successful set operations
    sets: CachePadded<AtomicU64>,
    /// Entries evicted for capacity
    evictions: CachePadded<AtomicU64>,
    /// Entries removed because their TTL elapsed
    expired_removals: CachePadded<AtomicU64>,
    /// Keys removed through explicit invalidation
    invalidations: CachePadded<AtomicU64>,
    /// Best-effort shared-tier writes that failed
    l2_write_failures: CachePadded<AtomicU64>,
    /// Shared-tier reads that failed after retries
    l2_read_failures: CachePadded<AtomicU64>,
    /// Calls short-circuited by the open circuit
    l2_short_circuits: CachePadded<AtomicU64>,
    /// Stored payloads or envelopes that failed to decode
    decode_failures: CachePadded<AtomicU64>,
    /// Payloads too large for the memory tier
    oversize_rejections: CachePadded<AtomicU64>,
    /// Raw bytes seen by the compression selector
    compression_raw_bytes: CachePadded<AtomicU64>,
    /// Bytes actually stored after encoding
    compression_stored_bytes: CachePadded<AtomicU64>,
    /// Encode calls that recorded a ratio
    compression_ops: CachePadded<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired_removals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_l2_write_failure(&self) {
        self.l2_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_read_failure(&self) {
        self.l2_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_short_circuit(&self) {
        self.l2_short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oversize_rejection(&self) {
        self.oversize_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one compression decision: raw input size and stored output size
    pub fn record_compression(&self, raw_bytes: u64, stored_bytes: u64) {
        self.compression_raw_bytes
            .fetch_add(raw_bytes, Ordering::Relaxed);
        self.compression_stored_bytes
            .fetch_add(stored_bytes, Ordering::Relaxed);
        self.compression_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a read-only snapshot from the live counters
    pub fn snapshot(
        &self,
        l2_state: L2LinkState,
        item_count: usize,
        memory_bytes_used: u64,
    ) -> MetricsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hits = l1_hits + l2_hits;
        let lookups = hits + misses;
        let raw = self.compression_raw_bytes.load(Ordering::Relaxed);
        let stored = self.compression_stored_bytes.load(Ordering::Relaxed);

        MetricsSnapshot {
            hit_count: hits,
            l1_hit_count: l1_hits,
            l2_hit_count: l2_hits,
            miss_count: misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            set_count: self.sets.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expired_count: self.expired_removals.load(Ordering::Relaxed),
            invalidation_count: self.invalidations.load(Ordering::Relaxed),
            l2_write_failures: self.l2_write_failures.load(Ordering::Relaxed),
            l2_read_failures: self.l2_read_failures.load(Ordering::Relaxed),
            l2_short_circuits: self.l2_short_circuits.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            oversize_rejections: self.oversize_rejections.load(Ordering::Relaxed),
            compression_ratio_average: if raw > 0 {
                stored as f64 / raw as f64
            } else {
                1.0
            },
            l2_state,
            item_count,
            memory_bytes_used,
        }
    }
}

/// Read-only view of cache health, rebuilt on demand
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub hit_count: u64,
    pub l1_hit_count: u64,
    pub l2_hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub set_count: u64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub invalidation_count: u64,
    pub l2_write_failures: u64,
    pub l2_read_failures: u64,
    pub l2_short_circuits: u64,
    pub decode_failures: u64,
    pub oversize_rejections: u64,
    /// Average stored/raw ratio across recorded compressions; 1.0 when none
    pub compression_ratio_average: f64,
    pub l2_state: L2LinkState,
    pub item_count: usize,
    pub memory_bytes_used: u64,
}
