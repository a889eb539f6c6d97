//! Multi-level orchestrator composing the memory and shared tiers
//!
//! Lookups consult the memory tier first, then the shared tier when its link
//! allows; shared hits repopulate the memory tier with their remaining
//! lifetime. Writes always land in the memory tier; the shared write is
//! best-effort and never fails the call. Shared-tier failures degrade to a
//! miss or an L1-only write, recorded in metrics, never surfaced as errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::compression::CompressionCodec;
use crate::cache::error::CacheError;
use crate::cache::invalidation::InvalidationManager;
use crate::cache::telemetry::CacheMetrics;
use crate::cache::tier::memory::MemoryTier;
use crate::cache::tier::shared::SharedTierClient;
use crate::cache::traits::{CacheEvent, Clock, ObserverRegistry};
use crate::cache::ttl::TtlPolicy;
use crate::cache::types::{CacheEntry, CacheTier, EntryEnvelope};

/// Per-write options for [`TierCoordinator::set`]
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Exact TTL for this entry, bypassing the adaptive policy
    pub ttl: Option<Duration>,
    /// Data class fed to the TTL policy (e.g. "product", "inventory")
    pub data_class: Option<String>,
    /// Tags for tag-based invalidation
    pub tags: Vec<String>,
    /// Keys this entry is derived from, for cascade invalidation
    pub depends_on: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn data_class(mut self, class: impl Into<String>) -> Self {
        self.data_class = Some(class.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }
}

/// Composes the tiers behind one get/set surface
#[derive(Debug)]
pub struct TierCoordinator {
    memory: Arc<MemoryTier>,
    shared: Option<Arc<SharedTierClient>>,
    invalidation: Arc<InvalidationManager>,
    codec: CompressionCodec,
    ttl_policy: TtlPolicy,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    observers: Arc<ObserverRegistry>,
}

impl TierCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        memory: Arc<MemoryTier>,
        shared: Option<Arc<SharedTierClient>>,
        invalidation: Arc<InvalidationManager>,
        codec: CompressionCodec,
        ttl_policy: TtlPolicy,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            memory,
            shared,
            invalidation,
            codec,
            ttl_policy,
            default_ttl,
            clock,
            metrics,
            observers,
        }
    }

    /// Look up a key across both tiers
    ///
    /// Returns the decoded payload or a miss; the caller owns the origin
    /// fetch on a miss. Shared-tier trouble of any kind degrades to a miss.
    pub async fn get(&self, key: &str, deadline: Option<Instant>) -> Option<Vec<u8>> {
        if let Some(entry) = self.memory.get(key) {
            match self.codec.decode(&entry.payload, entry.algorithm) {
                Ok(raw) => {
                    self.metrics.record_l1_hit();
                    self.emit_hit(key, CacheTier::Memory);
                    return Some(raw);
                }
                Err(e) => {
                    log::warn!("dropping undecodable memory entry '{}': {}", key, e);
                    self.metrics.record_decode_failure();
                    self.memory.remove(key);
                }
            }
        }

        if let Some(raw) = self.get_from_shared(key, deadline).await {
            return Some(raw);
        }

        self.metrics.record_miss();
        if self.observers.is_active() {
            self.observers.emit(&CacheEvent::Miss {
                key: key.to_string(),
            });
        }
        None
    }

    /// Shared-tier leg of a lookup; any failure collapses to `None`
    async fn get_from_shared(&self, key: &str, deadline: Option<Instant>) -> Option<Vec<u8>> {
        let shared = self.shared.as_ref()?;
        let bytes = match shared.get(key, deadline).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("shared tier read for '{}' degraded to miss: {}", key, e);
                return None;
            }
        };

        let entry = match EntryEnvelope::decode(&bytes) {
            Ok(envelope) => envelope.into_entry(),
            Err(e) => {
                log::warn!("dropping undecodable shared entry '{}': {}", key, e);
                self.metrics.record_decode_failure();
                self.drop_shared_entry(shared, key).await;
                return None;
            }
        };

        let now = self.clock.epoch_millis();
        if entry.is_expired(now) {
            self.drop_shared_entry(shared, key).await;
            return None;
        }

        let raw = match self.codec.decode(&entry.payload, entry.algorithm) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("dropping undecodable shared payload '{}': {}", key, e);
                self.metrics.record_decode_failure();
                self.drop_shared_entry(shared, key).await;
                return None;
            }
        };

        // Promote with the original lifetime, not a fresh one
        self.invalidation
            .register(key, &entry.tags, &entry.depends_on);
        self.memory.insert(key, entry);
        self.metrics.record_l2_hit();
        self.emit_hit(key, CacheTier::Shared);
        Some(raw)
    }

    /// Store a value: memory tier unconditionally, shared tier best-effort
    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: SetOptions,
    ) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::invalid_argument("key must not be empty"));
        }
        if let Some(ttl) = options.ttl
            && ttl.is_zero()
        {
            return Err(CacheError::invalid_argument("ttl override must be positive"));
        }

        let ttl = match options.ttl {
            Some(ttl) => ttl,
            None => {
                let previous_accesses = self.memory.peek_access_count(key);
                self.ttl_policy.compute(
                    key,
                    options.data_class.as_deref(),
                    self.default_ttl,
                    value.len(),
                    previous_accesses,
                )
            }
        };

        let (encoded, algorithm) = self.codec.encode(value);
        let now = self.clock.epoch_millis();
        let entry = CacheEntry::new(
            encoded,
            value.len(),
            algorithm,
            ttl,
            now,
            options.tags.clone(),
            options.depends_on.clone(),
        );
        let envelope = EntryEnvelope::from_entry(&entry).encode();

        self.invalidation
            .register(key, &options.tags, &options.depends_on);
        self.memory.insert(key, entry);
        self.metrics.record_set();

        if let Some(shared) = &self.shared {
            match envelope {
                Ok(bytes) => {
                    if let Err(e) = shared.set(key, &bytes, ttl).await {
                        log::warn!("best-effort shared write for '{}' absorbed: {}", key, e);
                        if self.observers.is_active() {
                            self.observers.emit(&CacheEvent::SharedWriteFailed {
                                key: key.to_string(),
                            });
                        }
                    }
                }
                Err(e) => log::warn!("shared envelope for '{}' failed to encode: {}", key, e),
            }
        }
        Ok(())
    }

    async fn drop_shared_entry(&self, shared: &SharedTierClient, key: &str) {
        if let Err(e) = shared.delete(key).await {
            log::debug!("best-effort shared delete for '{}' failed: {}", key, e);
        }
    }

    fn emit_hit(&self, key: &str, tier: CacheTier) {
        if self.observers.is_active() {
            self.observers.emit(&CacheEvent::Hit {
                key: key.to_string(),
                tier,
            });
        }
    }
}
