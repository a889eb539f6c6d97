//! Adaptive TTL policy engine
//!
//! Computes an entry lifetime from its data class, access history, and payload
//! size, then spreads expiry with deterministic per-key jitter so a burst of
//! writes does not expire as one synchronized wave. The whole computation is a
//! pure function of its inputs; no clock or randomness source is consulted.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::config::TtlConfig;

/// Access count at which the access multiplier saturates at 2.0
const ACCESS_SATURATION: f64 = 100.0;

/// FNV-1a offset basis and prime (64-bit)
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// TTL policy engine; immutable after construction
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    class_multipliers: HashMap<String, f64>,
    jitter_factor: f64,
    min_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(config: &TtlConfig) -> Self {
        Self {
            class_multipliers: config.class_multipliers.clone(),
            jitter_factor: config.jitter_factor,
            min_ttl: Duration::from_secs(config.min_ttl_secs),
        }
    }

    /// Compute an entry's lifetime
    ///
    /// `base * class * access * size * jitter`, floored at the configured
    /// minimum. Identical inputs always yield the identical TTL.
    pub fn compute(
        &self,
        key: &str,
        data_class: Option<&str>,
        base_ttl: Duration,
        size_bytes: usize,
        access_count: u64,
    ) -> Duration {
        let multiplier = self.class_multiplier(data_class)
            * Self::access_multiplier(access_count)
            * Self::size_multiplier(size_bytes)
            * self.jitter(key);
        let ttl = Duration::from_secs_f64(base_ttl.as_secs_f64() * multiplier);
        ttl.max(self.min_ttl)
    }

    fn class_multiplier(&self, data_class: Option<&str>) -> f64 {
        data_class
            .and_then(|class| self.class_multipliers.get(class))
            .copied()
            .unwrap_or(1.0)
    }

    /// Frequently accessed keys live longer, capped at 2x
    fn access_multiplier(access_count: u64) -> f64 {
        (1.0 + (access_count as f64 / ACCESS_SATURATION) * 0.5).min(2.0)
    }

    /// Larger payloads expire sooner to bound memory
    fn size_multiplier(size_bytes: usize) -> f64 {
        match size_bytes {
            s if s < 1024 => 1.2,
            s if s < 10 * 1024 => 1.0,
            s if s < 100 * 1024 => 0.8,
            _ => 0.6,
        }
    }

    /// Bounded, deterministic, key-dependent jitter in
    /// `[1 - jitter_factor, 1 + jitter_factor)`
    fn jitter(&self, key: &str) -> f64 {
        if self.jitter_factor == 0.0 {
            return 1.0;
        }
        let bucket = (fnv1a(key.as_bytes()) % 1000) as f64 / 1000.0;
        1.0 + self.jitter_factor * (bucket - 0.5) * 2.0
    }
}

/// FNV-1a hash over the key bytes; stable across processes and versions
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
