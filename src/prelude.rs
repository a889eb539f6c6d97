//! Convenience re-exports for common usage

pub use crate::cache::coordinator::SetOptions;
pub use crate::cache::error::CacheError;
pub use crate::cache::telemetry::MetricsSnapshot;
pub use crate::cache::traits::{CacheEvent, CacheObserver};
pub use crate::cache::types::L2LinkState;
pub use crate::stratacache::{StrataCache, StrataCacheBuilder};
