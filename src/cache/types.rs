//! Core data model: entries, wire envelope, and supporting enums
//!
//! A cached value is an opaque byte payload plus an explicit metadata record;
//! callers supply and interpret their own value schema. The `compressed` state
//! of an entry is derived from its recorded algorithm, so the invariant
//! "compressed implies an algorithm" holds by construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::cache::error::CacheError;

/// Compression algorithm recorded alongside each stored payload
///
/// Persisted in the shared-tier envelope so a differently configured process
/// can still decode the entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum CompressionAlgorithm {
    /// Payload stored raw
    None,
    /// Fast, low-ratio compression for medium payloads
    Lz4,
    /// Slower, high-ratio compression for large payloads
    Zstd,
}

impl CompressionAlgorithm {
    /// Whether this marker means the payload is stored uncompressed
    pub fn is_none(&self) -> bool {
        matches!(self, CompressionAlgorithm::None)
    }
}

/// Cache tier that served an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CacheTier {
    /// In-process memory tier (L1)
    Memory,
    /// Out-of-process shared tier (L2)
    Shared,
}

/// Why an entry left the memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EvictionCause {
    /// Removed to respect capacity bounds
    Capacity,
    /// TTL elapsed (lazy check or background sweep)
    Expired,
    /// Explicitly invalidated
    Invalidated,
}

/// Health of the shared-tier link as seen by the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum L2LinkState {
    /// Recent operations succeeded
    Healthy,
    /// Some failures observed, still below the circuit threshold
    Degraded,
    /// Circuit open; calls short-circuit until the cooldown elapses
    Unavailable,
}

impl std::fmt::Display for L2LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            L2LinkState::Healthy => write!(f, "healthy"),
            L2LinkState::Degraded => write!(f, "degraded"),
            L2LinkState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Per-entry access metadata with atomic fields
///
/// Updated on every hit without taking the shard write lock.
#[derive(Debug)]
pub struct EntryMetadata {
    /// Last access timestamp, epoch milliseconds
    last_access_ms: CachePadded<AtomicU64>,
    /// Access count since insertion
    access_count: CachePadded<AtomicU64>,
}

impl EntryMetadata {
    pub fn new(now_ms: u64) -> Self {
        Self {
            last_access_ms: CachePadded::new(AtomicU64::new(now_ms)),
            access_count: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Record an access: bump the counter and refresh the recency stamp
    pub fn touch(&self, now_ms: u64) {
        self.last_access_ms.store(now_ms, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }
}

/// Clone via atomic loads; the copy starts from the observed values
impl Clone for EntryMetadata {
    fn clone(&self) -> Self {
        Self {
            last_access_ms: CachePadded::new(AtomicU64::new(
                self.last_access_ms.load(Ordering::Relaxed),
            )),
            access_count: CachePadded::new(AtomicU64::new(
                self.access_count.load(Ordering::Relaxed),
            )),
        }
    }
}

/// A cache entry owned by the memory tier
///
/// `payload` holds the stored (possibly compressed) bytes; `raw_size` is the
/// original payload length before encoding.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<[u8]>,
    pub raw_size: usize,
    pub algorithm: CompressionAlgorithm,
    pub ttl: Duration,
    pub created_at_ms: u64,
    pub metadata: EntryMetadata,
    pub tags: Arc<[String]>,
    pub depends_on: Arc<[String]>,
}

/// Fixed per-entry bookkeeping overhead used for byte accounting
const ENTRY_OVERHEAD_BYTES: usize = 96;

impl CacheEntry {
    pub fn new(
        payload: Vec<u8>,
        raw_size: usize,
        algorithm: CompressionAlgorithm,
        ttl: Duration,
        created_at_ms: u64,
        tags: Vec<String>,
        depends_on: Vec<String>,
    ) -> Self {
        Self {
            payload: payload.into(),
            raw_size,
            algorithm,
            ttl,
            created_at_ms,
            metadata: EntryMetadata::new(created_at_ms),
            tags: tags.into(),
            depends_on: depends_on.into(),
        }
    }

    /// Whether the stored payload is compressed
    pub fn is_compressed(&self) -> bool {
        !self.algorithm.is_none()
    }

    /// TTL check against logical time; the exact boundary counts as expired
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) >= self.ttl.as_millis() as u64
    }

    /// Lifetime left at `now_ms`, or `None` once expired
    pub fn remaining_ttl(&self, now_ms: u64) -> Option<Duration> {
        let expires_at = self.created_at_ms + self.ttl.as_millis() as u64;
        if now_ms >= expires_at {
            None
        } else {
            Some(Duration::from_millis(expires_at - now_ms))
        }
    }

    /// Approximate memory cost of this entry under the given key
    pub fn cost_bytes(&self, key: &str) -> usize {
        self.payload.len()
            + key.len()
            + self.tags.iter().map(String::len).sum::<usize>()
            + self.depends_on.iter().map(String::len).sum::<usize>()
            + ENTRY_OVERHEAD_BYTES
    }
}

/// Wire form of an entry for the shared tier
///
/// Encoded with bincode; carries everything needed to rebuild a `CacheEntry`
/// in another process, including the compression algorithm.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct EntryEnvelope {
    pub raw_size: u64,
    pub algorithm: CompressionAlgorithm,
    pub ttl_seconds: u64,
    pub created_at_ms: u64,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub payload: Vec<u8>,
}

impl EntryEnvelope {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            raw_size: entry.raw_size as u64,
            algorithm: entry.algorithm,
            ttl_seconds: entry.ttl.as_secs().max(1),
            created_at_ms: entry.created_at_ms,
            tags: entry.tags.to_vec(),
            depends_on: entry.depends_on.to_vec(),
            payload: entry.payload.to_vec(),
        }
    }

    /// Rebuild a memory-tier entry from the wire form
    pub fn into_entry(self) -> CacheEntry {
        CacheEntry::new(
            self.payload,
            self.raw_size as usize,
            self.algorithm,
            Duration::from_secs(self.ttl_seconds),
            self.created_at_ms,
            self.tags,
            self.depends_on,
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CacheError::serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(envelope, _)| envelope)
            .map_err(|e| CacheError::serialization(e.to_string()))
    }
}
