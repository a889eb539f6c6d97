//! Invalidation manager: key, pattern, tag, and dependency-based removal
//!
//! Maintains the tag index and the dependency graph, and removes entries from
//! both tiers. Shared-tier deletes are batched and best-effort. Every
//! operation is idempotent; invalidating an absent key is a no-op. Dependency
//! cascades detect cycles and truncate them instead of looping.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::error::CacheError;
use crate::cache::telemetry::CacheMetrics;
use crate::cache::tier::memory::MemoryTier;
use crate::cache::tier::shared::SharedTierClient;
use crate::cache::traits::{CacheEvent, ObserverRegistry};
use crate::cache::types::EvictionCause;

/// Next step of the iterative dependency walk
enum WalkStep {
    Visit(String),
    Finish(String),
    Done,
}

/// Pattern-, tag-, and dependency-based removal across both tiers
#[derive(Debug)]
pub struct InvalidationManager {
    memory: Arc<MemoryTier>,
    shared: Option<Arc<SharedTierClient>>,
    /// tag -> keys carrying it
    tag_index: DashMap<String, HashSet<String>>,
    /// source key -> keys that depend on it
    dependents: DashMap<String, HashSet<String>>,
    metrics: Arc<CacheMetrics>,
    observers: Arc<ObserverRegistry>,
}

impl InvalidationManager {
    pub fn new(
        memory: Arc<MemoryTier>,
        shared: Option<Arc<SharedTierClient>>,
        metrics: Arc<CacheMetrics>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            memory,
            shared,
            tag_index: DashMap::new(),
            dependents: DashMap::new(),
            metrics,
            observers,
        }
    }

    /// Index a freshly written entry's tags and dependencies
    pub fn register(&self, key: &str, tags: &[String], depends_on: &[String]) {
        for tag in tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        for source in depends_on {
            self.dependents
                .entry(source.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove a single key from both tiers
    pub async fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.remove_local(key);
        if removed {
            self.metrics.record_invalidation(1);
        }
        let keys = [key.to_string()];
        self.purge_shared(&keys).await;
        removed
    }

    /// Remove every key matching a glob pattern
    ///
    /// The matching memory-tier key set is also issued to the shared tier as
    /// one batched delete.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let compiled = glob::Pattern::new(pattern).map_err(|e| {
            CacheError::invalid_argument(format!("invalid pattern '{}': {}", pattern, e))
        })?;
        let keys = self.memory.keys_matching(&compiled);
        let mut removed = 0u64;
        for key in &keys {
            if self.remove_local(key) {
                removed += 1;
            }
        }
        self.metrics.record_invalidation(removed);
        self.purge_shared(&keys).await;
        Ok(removed)
    }

    /// Remove every key carrying a tag and drop the tag from the index
    pub async fn invalidate_tag(&self, tag: &str) -> u64 {
        let keys: Vec<String> = self
            .tag_index
            .remove(tag)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default();
        let mut removed = 0u64;
        for key in &keys {
            if self.remove_local(key) {
                removed += 1;
            }
        }
        self.metrics.record_invalidation(removed);
        self.purge_shared(&keys).await;
        removed
    }

    /// Cascade invalidation to the source key and all transitive dependents
    pub async fn invalidate_dependents(&self, source: &str) -> u64 {
        let closure = self.collect_closure(source);
        let mut removed = 0u64;
        for key in &closure {
            if self.remove_local(key) {
                removed += 1;
            }
        }
        // Every dependent is gone; drop their outgoing edges too
        for key in &closure {
            self.dependents.remove(key);
        }
        self.metrics.record_invalidation(removed);
        self.purge_shared(&closure).await;
        removed
    }

    /// Drop both indices; used by `clear`
    pub fn clear_indices(&self) {
        self.tag_index.clear();
        self.dependents.clear();
    }

    /// Remove from the memory tier and clean the key out of the tag index
    fn remove_local(&self, key: &str) -> bool {
        let Some(entry) = self.memory.remove(key) else {
            return false;
        };
        for tag in entry.tags.iter() {
            if let Some(mut set) = self.tag_index.get_mut(tag) {
                set.remove(key);
                let emptied = set.is_empty();
                drop(set);
                if emptied {
                    self.tag_index.remove_if(tag, |_, set| set.is_empty());
                }
            }
        }
        if self.observers.is_active() {
            self.observers.emit(&CacheEvent::Evicted {
                key: key.to_string(),
                cause: EvictionCause::Invalidated,
            });
        }
        true
    }

    /// Depth-first walk of the dependents graph, cycle-safe
    ///
    /// Returns the source plus all transitive dependents. A key reachable
    /// from itself is logged and the cascade truncated at that edge.
    fn collect_closure(&self, source: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut stack: Vec<(String, Vec<String>, usize)> = Vec::new();

        visited.insert(source.to_string());
        on_path.insert(source.to_string());
        stack.push((source.to_string(), self.children_of(source), 0));

        loop {
            let step = match stack.last_mut() {
                None => WalkStep::Done,
                Some((_, children, next)) if *next < children.len() => {
                    let child = children[*next].clone();
                    *next += 1;
                    WalkStep::Visit(child)
                }
                Some((key, _, _)) => WalkStep::Finish(key.clone()),
            };
            match step {
                WalkStep::Done => break,
                WalkStep::Visit(child) => {
                    if on_path.contains(&child) {
                        log::warn!(
                            "dependency cycle through '{}' while invalidating '{}', truncating cascade",
                            child,
                            source
                        );
                        if self.observers.is_active() {
                            self.observers
                                .emit(&CacheEvent::InvalidationCycle { key: child });
                        }
                        continue;
                    }
                    if visited.insert(child.clone()) {
                        on_path.insert(child.clone());
                        let grandchildren = self.children_of(&child);
                        stack.push((child, grandchildren, 0));
                    }
                }
                WalkStep::Finish(key) => {
                    on_path.remove(&key);
                    order.push(key);
                    stack.pop();
                }
            }
        }
        order
    }

    fn children_of(&self, key: &str) -> Vec<String> {
        self.dependents
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Batched best-effort delete against the shared tier
    async fn purge_shared(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Some(shared) = &self.shared
            && let Err(e) = shared.delete_many(keys).await
        {
            log::debug!("best-effort shared invalidation failed: {}", e);
        }
    }
}
