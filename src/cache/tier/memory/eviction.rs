//! Eviction scoring for the memory tier
//!
//! Each resident entry gets a retention score from weighted recency,
//! frequency, and inverse-size factors; the lowest score is evicted first.
//! The score function is public so capacity tests can instrument it.

use serde::{Deserialize, Serialize};

use crate::cache::types::CacheEntry;

/// Byte scale for the inverse-size factor; a 1 KiB entry contributes 1.0
const SIZE_FACTOR_SCALE: f64 = 1024.0;

/// Access count at which the frequency factor saturates
const FREQUENCY_SATURATION: f64 = 100.0;

/// Weights for the eviction score components
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvictionWeights {
    pub recency: f64,
    pub frequency: f64,
    pub size: f64,
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            frequency: 1.0,
            size: 0.5,
        }
    }
}

impl EvictionWeights {
    /// Retention score; higher means keep longer
    ///
    /// `w_recency * recency + w_frequency * frequency + w_size * (scale/size)`
    /// with recency decaying as the entry ages since its last access.
    pub fn score(&self, entry: &CacheEntry, now_ms: u64) -> f64 {
        let age_secs = now_ms.saturating_sub(entry.metadata.last_access_ms()) as f64 / 1000.0;
        let recency_factor = 1.0 / (1.0 + age_secs);
        let frequency_factor =
            (entry.metadata.access_count() as f64 / FREQUENCY_SATURATION).min(1.0);
        let size_factor = SIZE_FACTOR_SCALE / entry.payload.len().max(1) as f64;

        self.recency * recency_factor + self.frequency * frequency_factor + self.size * size_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::CompressionAlgorithm;
    use std::time::Duration;

    fn entry(payload_len: usize, created_at_ms: u64, accesses: u64) -> CacheEntry {
        let e = CacheEntry::new(
            vec![0u8; payload_len],
            payload_len,
            CompressionAlgorithm::None,
            Duration::from_secs(600),
            created_at_ms,
            vec![],
            vec![],
        );
        for _ in 0..accesses {
            e.metadata.touch(created_at_ms);
        }
        e
    }

    #[test]
    fn recently_accessed_scores_higher() {
        let weights = EvictionWeights::default();
        let now = 100_000;
        let stale = entry(1024, 0, 0);
        let fresh = entry(1024, 0, 0);
        fresh.metadata.touch(now);
        assert!(weights.score(&fresh, now) > weights.score(&stale, now));
    }

    #[test]
    fn frequently_accessed_scores_higher() {
        let weights = EvictionWeights::default();
        let now = 10_000;
        let cold = entry(1024, 0, 1);
        let hot = entry(1024, 0, 80);
        assert!(weights.score(&hot, now) > weights.score(&cold, now));
    }

    #[test]
    fn smaller_entries_score_higher() {
        let weights = EvictionWeights::default();
        let now = 10_000;
        let small = entry(512, 0, 0);
        let large = entry(64 * 1024, 0, 0);
        assert!(weights.score(&small, now) > weights.score(&large, now));
    }

    #[test]
    fn score_combines_all_three_factors() {
        let weights = EvictionWeights {
            recency: 1.0,
            frequency: 1.0,
            size: 0.5,
        };
        let now = 0;
        let e = entry(1024, 0, 50);
        e.metadata.touch(now);
        // recency 1.0, frequency 51/100 (touches include construction loop), size 1024/1024
        let expected = 1.0 + 0.51 + 0.5;
        assert!((weights.score(&e, now) - expected).abs() < 1e-9);
    }
}
