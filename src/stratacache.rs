//! Public API for the stratacache multi-tier cache manager
//!
//! `StrataCache` fronts the tier coordinator, the invalidation manager, and
//! the metrics collector behind one handle. Instances are explicitly
//! constructed through `StrataCacheBuilder`: configuration, clock, and the
//! shared-store connector are injected dependencies, never process globals.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::compression::CompressionCodec;
use crate::cache::config::CacheConfig;
use crate::cache::coordinator::{SetOptions, TierCoordinator};
use crate::cache::error::CacheError;
use crate::cache::invalidation::InvalidationManager;
use crate::cache::telemetry::{CacheMetrics, MetricsSnapshot};
use crate::cache::tier::memory::MemoryTier;
use crate::cache::tier::memory::eviction::EvictionWeights;
use crate::cache::tier::memory::sweeper::SweeperHandle;
use crate::cache::tier::shared::SharedTierClient;
use crate::cache::tier::shared::transport::{RespConnector, SharedConnector};
use crate::cache::traits::{CacheObserver, Clock, ObserverId, ObserverRegistry, SystemClock};
use crate::cache::ttl::TtlPolicy;
use crate::cache::types::L2LinkState;

struct CacheCore {
    config: CacheConfig,
    memory: Arc<MemoryTier>,
    shared: Option<Arc<SharedTierClient>>,
    coordinator: TierCoordinator,
    invalidation: Arc<InvalidationManager>,
    metrics: Arc<CacheMetrics>,
    observers: Arc<ObserverRegistry>,
    sweeper: std::sync::Mutex<Option<SweeperHandle>>,
}

impl Drop for CacheCore {
    fn drop(&mut self) {
        // Owner dropped without shutdown: do not leave the task running
        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(handle) = sweeper.take()
        {
            handle.abort();
        }
    }
}

/// Adaptive multi-tier cache manager
///
/// Cloning is cheap and every clone shares the same tiers, indices, and
/// background sweeper.
#[derive(Clone)]
pub struct StrataCache {
    inner: Arc<CacheCore>,
}

impl StrataCache {
    /// Create a cache builder with fluent configuration
    pub fn builder() -> StrataCacheBuilder {
        StrataCacheBuilder::new()
    }

    /// Look up a key; returns the decoded payload or a miss
    ///
    /// Shared-tier failures never surface here; they degrade to a miss while
    /// being recorded in metrics.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.coordinator.get(key, None).await
    }

    /// Look up a key with a latency budget
    ///
    /// Once the budget elapses, the in-flight shared-tier wait is abandoned
    /// (its connection recycled, not leaked) and the lookup reports a miss.
    pub async fn get_with_deadline(&self, key: &str, budget: Duration) -> Option<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + budget;
        self.inner.coordinator.get(key, Some(deadline)).await
    }

    /// Store a value with default options
    pub async fn set(&self, key: &str, value: impl AsRef<[u8]>) -> Result<(), CacheError> {
        self.set_with(key, value, SetOptions::new()).await
    }

    /// Store a value with TTL override, data class, tags, or dependencies
    pub async fn set_with(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        self.inner.coordinator.set(key, value.as_ref(), options).await
    }

    /// Remove a single key from both tiers; absent keys are a no-op
    pub async fn invalidate(&self, key: &str) -> bool {
        self.inner.invalidation.invalidate_key(key).await
    }

    /// Remove every key matching a glob pattern; returns the removed count
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.inner.invalidation.invalidate_pattern(pattern).await
    }

    /// Remove every key carrying a tag; returns the removed count
    pub async fn invalidate_tag(&self, tag: &str) -> u64 {
        self.inner.invalidation.invalidate_tag(tag).await
    }

    /// Cascade invalidation to a key and all its transitive dependents
    pub async fn invalidate_dependents(&self, key: &str) -> u64 {
        self.inner.invalidation.invalidate_dependents(key).await
    }

    /// Whether an unexpired entry is resident in the memory tier
    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.memory.contains_valid(key)
    }

    /// Entries resident in the memory tier
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.memory.is_empty()
    }

    /// Drop every memory-tier entry and both invalidation indices
    ///
    /// Shared-tier entries are left to their TTLs; the store offers no
    /// prefix-scoped flush.
    pub async fn clear(&self) {
        self.inner.memory.clear();
        self.inner.invalidation.clear_indices();
    }

    /// Current shared-tier link state
    pub fn link_state(&self) -> L2LinkState {
        self.inner
            .shared
            .as_ref()
            .map(|shared| shared.link_state())
            .unwrap_or(L2LinkState::Unavailable)
    }

    /// Read-only metrics snapshot rebuilt from the live counters
    pub fn stats(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot(
            self.link_state(),
            self.inner.memory.len(),
            self.inner.memory.bytes_used(),
        )
    }

    /// Metrics snapshot as a JSON string
    pub fn stats_json(&self) -> Result<String, CacheError> {
        serde_json::to_string(&self.stats()).map_err(|e| CacheError::serialization(e.to_string()))
    }

    /// Register a monitoring observer
    pub fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> ObserverId {
        self.inner.observers.subscribe(observer)
    }

    /// Remove a previously registered observer
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Identifier of this cache instance
    pub fn cache_id(&self) -> &str {
        &self.inner.config.cache_id
    }

    /// Stop the background sweeper and close the connection pool
    ///
    /// Idempotent; after shutdown the memory tier keeps serving but nothing
    /// autonomous runs and shared-tier checkouts fail fast.
    pub async fn shutdown(&self) {
        let handle = self
            .inner
            .sweeper
            .lock()
            .ok()
            .and_then(|mut sweeper| sweeper.take());
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        if let Some(shared) = &self.inner.shared {
            shared.close();
        }
        log::info!("cache '{}' shut down", self.inner.config.cache_id);
    }
}

impl std::fmt::Debug for StrataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrataCache")
            .field("cache_id", &self.inner.config.cache_id)
            .field("entries", &self.inner.memory.len())
            .field("l2_state", &self.link_state())
            .finish()
    }
}

/// Fluent builder for [`StrataCache`]
pub struct StrataCacheBuilder {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    connector: Option<Arc<dyn SharedConnector>>,
}

impl StrataCacheBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            clock: None,
            connector: None,
        }
    }

    /// Start from a fully populated configuration
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.config.cache_id = id.into();
        self
    }

    /// Prefix applied to every shared-tier key
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn default_ttl_secs(mut self, secs: u64) -> Self {
        self.config.default_ttl_secs = secs;
        self
    }

    pub fn ttl_jitter_factor(mut self, factor: f64) -> Self {
        self.config.ttl.jitter_factor = factor;
        self
    }

    /// Override or add a TTL multiplier for a data class
    pub fn ttl_class_multiplier(mut self, class: impl Into<String>, multiplier: f64) -> Self {
        self.config
            .ttl
            .class_multipliers
            .insert(class.into(), multiplier);
        self
    }

    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.config.compression.enabled = enabled;
        self
    }

    pub fn compression_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.compression.threshold_bytes = bytes;
        self
    }

    pub fn memory_max_entries(mut self, max_entries: usize) -> Self {
        self.config.memory.max_entries = max_entries;
        self
    }

    pub fn memory_max_bytes(mut self, max_bytes: u64) -> Self {
        self.config.memory.max_bytes = max_bytes;
        self
    }

    pub fn eviction_weights(mut self, weights: EvictionWeights) -> Self {
        self.config.memory.eviction = weights;
        self
    }

    /// Address of the shared store; omitting it builds an L1-only cache
    pub fn shared_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.shared.endpoint = Some(endpoint.into());
        self
    }

    pub fn pool_min_size(mut self, size: usize) -> Self {
        self.config.shared.pool_min_size = size;
        self
    }

    pub fn pool_max_size(mut self, size: usize) -> Self {
        self.config.shared.pool_max_size = size;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shared.connect_timeout_ms = ms;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shared.read_timeout_ms = ms;
        self
    }

    pub fn checkout_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shared.checkout_timeout_ms = ms;
        self
    }

    pub fn circuit_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.shared.circuit_failure_threshold = threshold;
        self
    }

    pub fn circuit_cooldown_ms(mut self, ms: u64) -> Self {
        self.config.shared.circuit_cooldown_ms = ms;
        self
    }

    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.shared.retry.max_attempts = attempts;
        self
    }

    pub fn sweep_interval_ms(mut self, ms: u64) -> Self {
        self.config.sweeper.interval_ms = ms;
        self
    }

    /// Inject a clock; defaults to the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Inject a shared-store connector, replacing the TCP default
    ///
    /// Takes precedence over `shared_endpoint`; tests use this to run against
    /// an in-memory store.
    pub fn shared_connector(mut self, connector: Arc<dyn SharedConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validate the configuration and assemble the cache
    ///
    /// Fails only on configuration errors. An unreachable shared store is not
    /// fatal: the pool warms lazily and the circuit degrades the link.
    pub async fn build(self) -> Result<StrataCache, CacheError> {
        self.config.validate()?;
        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = Arc::new(CacheMetrics::new());
        let observers = Arc::new(ObserverRegistry::new());

        let memory = Arc::new(MemoryTier::new(
            &config.memory,
            clock.clone(),
            metrics.clone(),
            observers.clone(),
        ));

        let connector: Option<Arc<dyn SharedConnector>> = match self.connector {
            Some(connector) => Some(connector),
            None => config
                .shared
                .endpoint
                .as_ref()
                .map(|endpoint| Arc::new(RespConnector::new(endpoint.clone())) as _),
        };
        let shared = connector.map(|connector| {
            Arc::new(SharedTierClient::new(
                connector,
                &config.shared,
                config.key_prefix.clone(),
                clock.clone(),
                metrics.clone(),
                observers.clone(),
            ))
        });
        if let Some(shared) = &shared {
            shared.warm_up().await;
        }

        let invalidation = Arc::new(InvalidationManager::new(
            memory.clone(),
            shared.clone(),
            metrics.clone(),
            observers.clone(),
        ));
        let coordinator = TierCoordinator::new(
            memory.clone(),
            shared.clone(),
            invalidation.clone(),
            CompressionCodec::new(&config.compression, metrics.clone()),
            TtlPolicy::new(&config.ttl),
            config.default_ttl(),
            clock.clone(),
            metrics.clone(),
            observers.clone(),
        );
        let sweeper = SweeperHandle::spawn(memory.clone(), config.sweep_interval());

        Ok(StrataCache {
            inner: Arc::new(CacheCore {
                config,
                memory,
                shared,
                coordinator,
                invalidation,
                metrics,
                observers,
                sweeper: std::sync::Mutex::new(Some(sweeper)),
            }),
        })
    }
}

impl Default for StrataCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tier::shared::mock::{MockConnector, MockStore};
    use crate::cache::traits::{CacheEvent, ManualClock};
    use std::sync::Mutex;

    async fn l1_only() -> StrataCache {
        StrataCache::builder()
            .sweep_interval_ms(3_600_000)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_get_invalidate_round_trip() {
        let cache = l1_only().await;
        cache.set("k", b"value").await.unwrap();
        assert_eq!(cache.get("k").await, Some(b"value".to_vec()));
        assert!(cache.contains_key("k").await);

        assert!(cache.invalidate("k").await);
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.invalidate("k").await, "second invalidation is a no-op");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_configuration_fails_construction() {
        let result = StrataCache::builder().pool_min_size(0).build().await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = l1_only().await;
        cache.set("k", b"v").await.unwrap();
        let _ = cache.get("k").await;
        let _ = cache.get("absent").await;

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.set_count, 1);
        assert_eq!(stats.item_count, 1);
        assert!(stats.memory_bytes_used > 0);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn tag_invalidation_spares_untagged_keys() {
        let cache = l1_only().await;
        cache
            .set_with("a", b"1", SetOptions::new().tag("batch"))
            .await
            .unwrap();
        cache
            .set_with("b", b"2", SetOptions::new().tag("batch"))
            .await
            .unwrap();
        cache.set("c", b"3").await.unwrap();

        assert_eq!(cache.invalidate_tag("batch").await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("c").await, Some(b"3".to_vec()));
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn dependency_cascade_through_the_facade() {
        let cache = l1_only().await;
        cache.set("source", b"s").await.unwrap();
        cache
            .set_with("derived", b"d", SetOptions::new().depends_on("source"))
            .await
            .unwrap();

        assert_eq!(cache.invalidate_dependents("source").await, 2);
        assert_eq!(cache.get("derived").await, None);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn circuit_opens_then_recovers_through_probe() {
        let store = MockStore::shared();
        let clock = ManualClock::starting_at(0);
        let cache = StrataCache::builder()
            .shared_connector(Arc::new(MockConnector::new(store.clone())))
            .clock(clock.clone())
            .circuit_failure_threshold(2)
            .circuit_cooldown_ms(5_000)
            .retry_max_attempts(1)
            .sweep_interval_ms(3_600_000)
            .build()
            .await
            .unwrap();

        // Break the store: two failing sets open the circuit
        store.fail_ops(u32::MAX);
        cache.set("a", b"1").await.unwrap();
        cache.set("b", b"2").await.unwrap();
        assert_eq!(cache.link_state(), L2LinkState::Unavailable);

        // Open circuit: operations succeed from L1 with no network attempts
        let ops_before = store.op_count();
        cache.set("c", b"3").await.unwrap();
        assert_eq!(cache.get("c").await, Some(b"3".to_vec()));
        assert_eq!(store.op_count(), ops_before, "no network while open");

        // After the cooldown one probe restores the link
        store.fail_ops(0);
        clock.advance(Duration::from_millis(5_000));
        cache.set("d", b"4").await.unwrap();
        assert_eq!(cache.link_state(), L2LinkState::Healthy);
        assert!(store.contains("d"), "writes reach the store again");
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_same_key_sets_leave_a_consistent_value() {
        let cache = l1_only().await;
        let writers: Vec<_> = [b"1".as_slice(), b"2".as_slice()]
            .into_iter()
            .map(|value| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        cache.set("k", value).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let got = cache.get("k").await.expect("value resident");
        assert!(got == b"1" || got == b"2");
        cache.shutdown().await;
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CacheEvent>>,
    }

    impl CacheObserver for Recorder {
        fn on_event(&self, event: &CacheEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn observers_receive_hit_and_miss_events() {
        let cache = l1_only().await;
        let recorder = Arc::new(Recorder::default());
        let id = cache.subscribe(recorder.clone());

        cache.set("k", b"v").await.unwrap();
        let _ = cache.get("k").await;
        let _ = cache.get("absent").await;

        let events = recorder.events.lock().unwrap().clone();
        assert!(events.iter().any(|e| matches!(e, CacheEvent::Hit { .. })));
        assert!(events.iter().any(|e| matches!(e, CacheEvent::Miss { .. })));
        drop(events);

        assert!(cache.unsubscribe(id));
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let cache = l1_only().await;
        cache.shutdown().await;
        cache.shutdown().await;
        // Memory tier still serves after shutdown
        cache.set("k", b"v").await.unwrap();
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }
}
