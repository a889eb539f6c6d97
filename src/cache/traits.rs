//! Injectable seams: clock source and cache observers
//!
//! The manager receives its clock as a dependency so TTL expiry, circuit
//! cooldowns, and eviction recency are deterministic under test. Monitoring
//! collaborators attach through an explicit observer interface instead of
//! hidden global listeners.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::types::{CacheTier, EvictionCause, L2LinkState};

/// Millisecond-resolution clock abstraction
///
/// All logical time in the cache (entry creation, expiry, circuit cooldown
/// deadlines) flows through this trait.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time as milliseconds since the Unix epoch
    fn epoch_millis(&self) -> u64;
}

/// Wall-clock implementation used outside of tests
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for deterministic expiry and cooldown tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at the given epoch offset
    pub fn starting_at(epoch_millis: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(epoch_millis),
        })
    }

    /// Advance the clock by a duration
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute epoch offset
    pub fn set_millis(&self, epoch_millis: u64) {
        self.now_ms.store(epoch_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Events pushed to registered observers
///
/// Emitted alongside the pull-based metrics snapshot; events are only
/// constructed when at least one observer is subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A lookup was served from the given tier
    Hit { key: String, tier: CacheTier },
    /// A lookup missed both tiers
    Miss { key: String },
    /// An entry was removed to respect capacity bounds or because it expired
    Evicted { key: String, cause: EvictionCause },
    /// The shared tier link changed state
    LinkStateChanged { state: L2LinkState },
    /// A best-effort shared-tier write failed and was absorbed
    SharedWriteFailed { key: String },
    /// A dependency cycle was detected and truncated during invalidation
    InvalidationCycle { key: String },
}

/// Observer callback interface for monitoring collaborators
pub trait CacheObserver: Send + Sync {
    /// Called synchronously for every emitted event; implementations must be cheap
    fn on_event(&self, event: &CacheEvent);
}

/// Handle returned by [`ObserverRegistry::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Subscribe/unsubscribe registry dispatching [`CacheEvent`]s
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: std::sync::RwLock<Vec<(u64, Arc<dyn CacheObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; returns the id needed to unsubscribe
    pub fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.observers.write() {
            observers.push((id, observer));
        }
        ObserverId(id)
    }

    /// Remove a previously registered observer; returns whether it was present
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        if let Ok(mut observers) = self.observers.write() {
            let before = observers.len();
            observers.retain(|(oid, _)| *oid != id.0);
            return observers.len() != before;
        }
        false
    }

    /// Whether any observer is subscribed; callers skip event construction otherwise
    pub fn is_active(&self) -> bool {
        self.observers.read().map(|o| !o.is_empty()).unwrap_or(false)
    }

    /// Dispatch an event to every subscribed observer
    pub fn emit(&self, event: &CacheEvent) {
        if let Ok(observers) = self.observers.read() {
            for (_, observer) in observers.iter() {
                observer.on_event(event);
            }
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.observers.read().map(|o| o.len()).unwrap_or(0);
        f.debug_struct("ObserverRegistry")
            .field("observers", &count)
            .finish()
    }
}
