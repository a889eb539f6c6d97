//! Stratacache - adaptive multi-tier cache manager
//!
//! A two-tier cache composing a bounded in-process store with a pooled client
//! for an external shared key-value store, built for graceful degradation
//! when the shared tier misbehaves.
//!
//! # Features
//!
//! - **Multi-tier architecture**: memory tier (L1) fronting a shared tier (L2)
//!   with automatic promotion on shared hits
//! - **Adaptive TTLs**: lifetimes computed from data class, access history,
//!   and payload size, with deterministic per-key jitter against stampedes
//! - **Payload compression**: size-tiered LZ4/Zstd selection, the algorithm
//!   recorded with every entry
//! - **Scored eviction**: weighted recency/frequency/size scoring bounds the
//!   memory tier by entry count and bytes
//! - **Circuit breaking**: consecutive failures open the shared-tier link;
//!   calls short-circuit through the cooldown and a single probe restores it
//! - **Invalidation**: by key, glob pattern, tag, or dependency cascade with
//!   cycle detection
//! - **Deterministic under test**: clock and shared-store connector are
//!   injected dependencies

// Public API modules
pub mod prelude;
pub mod stratacache;

// Cache implementation modules
pub mod cache;

// Re-export the public API at the crate root for convenience
pub use cache::config::{
    CacheConfig, CompressionConfig, ConfigError, MemoryTierConfig, RetryConfig, SharedTierConfig,
    SweeperConfig, TtlConfig,
};
pub use cache::coordinator::SetOptions;
pub use cache::error::CacheError;
pub use cache::telemetry::MetricsSnapshot;
pub use cache::tier::memory::eviction::EvictionWeights;
pub use cache::tier::shared::transport::{RespConnector, SharedConnection, SharedConnector};
pub use cache::traits::{
    CacheEvent, CacheObserver, Clock, ManualClock, ObserverId, SystemClock,
};
pub use cache::types::{CacheTier, CompressionAlgorithm, EvictionCause, L2LinkState};
pub use stratacache::{StrataCache, StrataCacheBuilder};
