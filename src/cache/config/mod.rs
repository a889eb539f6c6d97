//! Cache configuration types and construction-time validation
//!
//! Configuration is immutable after construction. Invalid values (zero pool
//! size, zero TTL, jitter outside the unit interval) are fatal at build time;
//! nothing at runtime ever re-validates.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::error::CacheError;
use crate::cache::tier::memory::eviction::EvictionWeights;

/// TTL policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Jitter factor in [0, 1] applied to computed TTLs
    pub jitter_factor: f64,
    /// Lower bound for any computed TTL, in seconds
    pub min_ttl_secs: u64,
    /// Data-class multipliers; unknown classes fall back to 1.0
    pub class_multipliers: HashMap<String, f64>,
}

impl Default for TtlConfig {
    fn default() -> Self {
        let mut class_multipliers = HashMap::new();
        class_multipliers.insert("product".to_string(), 1.5);
        class_multipliers.insert("inventory".to_string(), 0.5);
        class_multipliers.insert("customer".to_string(), 2.0);
        class_multipliers.insert("session".to_string(), 0.75);
        class_multipliers.insert("analytics".to_string(), 1.25);
        Self {
            jitter_factor: 0.1,
            min_ttl_secs: 1,
            class_multipliers,
        }
    }
}

/// Compression selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Payloads at or below this size are stored raw
    pub threshold_bytes: usize,
    /// Payloads at or above this size use the high-ratio algorithm
    pub large_payload_bytes: usize,
    /// Zstd compression level (1-21)
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024,
            large_payload_bytes: 128 * 1024,
            zstd_level: 3,
        }
    }
}

/// Memory tier (L1) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTierConfig {
    pub max_entries: usize,
    pub max_bytes: u64,
    pub eviction: EvictionWeights,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
            eviction: EvictionWeights::default(),
        }
    }
}

/// Retry policy configuration shared by every shared-tier call path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Bounded jitter as a fraction of the computed delay, in [0, 1]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2.0,
            max_delay_ms: 2_000,
            jitter_ratio: 0.2,
        }
    }
}

/// Shared tier (L2) client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedTierConfig {
    /// Address of the shared store; `None` builds an L1-only cache
    pub endpoint: Option<String>,
    pub pool_min_size: usize,
    pub pool_max_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Pool checkout wait, distinct from the request timeouts
    pub checkout_timeout_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_ms: u64,
    pub retry: RetryConfig,
}

impl Default for SharedTierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            pool_min_size: 2,
            pool_max_size: 8,
            connect_timeout_ms: 500,
            read_timeout_ms: 1_000,
            checkout_timeout_ms: 500,
            circuit_failure_threshold: 5,
            circuit_cooldown_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl SharedTierConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }
}

/// Background TTL sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub interval_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
        }
    }
}

/// Main cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache_id: String,
    /// Prefix applied to every shared-tier key
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    pub ttl: TtlConfig,
    pub compression: CompressionConfig,
    pub memory: MemoryTierConfig,
    pub shared: SharedTierConfig,
    pub sweeper: SweeperConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_id: Uuid::new_v4().to_string(),
            key_prefix: String::new(),
            default_ttl_secs: 300,
            ttl: TtlConfig::default(),
            compression: CompressionConfig::default(),
            memory: MemoryTierConfig::default(),
            shared: SharedTierConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweeper.interval_ms)
    }

    /// Validate every field; called once at construction
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl(
                "default_ttl_secs must be positive".to_string(),
            ));
        }
        if self.ttl.min_ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl(
                "min_ttl_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ttl.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.ttl.jitter_factor));
        }
        for (class, multiplier) in &self.ttl.class_multipliers {
            if *multiplier <= 0.0 || !multiplier.is_finite() {
                return Err(ConfigError::InvalidTtl(format!(
                    "class multiplier for '{}' must be positive and finite",
                    class
                )));
            }
        }
        if self.memory.max_entries == 0 {
            return Err(ConfigError::InvalidCapacity(
                "memory_max_entries must be positive".to_string(),
            ));
        }
        if self.memory.max_bytes == 0 {
            return Err(ConfigError::InvalidCapacity(
                "memory_max_bytes must be positive".to_string(),
            ));
        }
        if self.compression.enabled {
            if self.compression.large_payload_bytes <= self.compression.threshold_bytes {
                return Err(ConfigError::InvalidCompression(
                    "large_payload_bytes must exceed threshold_bytes".to_string(),
                ));
            }
            if !(1..=21).contains(&self.compression.zstd_level) {
                return Err(ConfigError::InvalidCompression(format!(
                    "zstd_level {} outside 1-21",
                    self.compression.zstd_level
                )));
            }
        }
        if self.shared.pool_min_size == 0 || self.shared.pool_max_size == 0 {
            return Err(ConfigError::InvalidPool(
                "pool sizes must be positive".to_string(),
            ));
        }
        if self.shared.pool_min_size > self.shared.pool_max_size {
            return Err(ConfigError::InvalidPool(format!(
                "pool_min_size {} exceeds pool_max_size {}",
                self.shared.pool_min_size, self.shared.pool_max_size
            )));
        }
        if self.shared.connect_timeout_ms == 0
            || self.shared.read_timeout_ms == 0
            || self.shared.checkout_timeout_ms == 0
        {
            return Err(ConfigError::InvalidPool(
                "shared tier timeouts must be positive".to_string(),
            ));
        }
        if self.shared.circuit_failure_threshold == 0 {
            return Err(ConfigError::InvalidPool(
                "circuit_failure_threshold must be positive".to_string(),
            ));
        }
        if self.shared.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be positive".to_string(),
            ));
        }
        if self.shared.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidRetry(format!(
                "multiplier {} below 1.0",
                self.shared.retry.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.shared.retry.jitter_ratio) {
            return Err(ConfigError::InvalidRetry(format!(
                "jitter_ratio {} outside [0, 1]",
                self.shared.retry.jitter_ratio
            )));
        }
        if self.sweeper.interval_ms == 0 {
            return Err(ConfigError::InvalidSweeper(
                "interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types; fatal at construction
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidTtl(String),
    InvalidJitter(f64),
    InvalidCapacity(String),
    InvalidCompression(String),
    InvalidPool(String),
    InvalidRetry(String),
    InvalidSweeper(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidTtl(msg) => write!(f, "Invalid TTL configuration: {}", msg),
            ConfigError::InvalidJitter(v) => {
                write!(f, "Jitter factor {} outside [0, 1]", v)
            }
            ConfigError::InvalidCapacity(msg) => {
                write!(f, "Invalid capacity configuration: {}", msg)
            }
            ConfigError::InvalidCompression(msg) => {
                write!(f, "Invalid compression configuration: {}", msg)
            }
            ConfigError::InvalidPool(msg) => {
                write!(f, "Invalid shared tier configuration: {}", msg)
            }
            ConfigError::InvalidRetry(msg) => write!(f, "Invalid retry configuration: {}", msg),
            ConfigError::InvalidSweeper(msg) => {
                write!(f, "Invalid sweeper configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CacheError {
    fn from(err: ConfigError) -> Self {
        CacheError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_is_fatal() {
        let mut config = CacheConfig::default();
        config.shared.pool_min_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPool(_))));
    }

    #[test]
    fn inverted_pool_bounds_are_fatal() {
        let mut config = CacheConfig::default();
        config.shared.pool_min_size = 10;
        config.shared.pool_max_size = 2;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPool(_))));
    }

    #[test]
    fn zero_ttl_is_fatal() {
        let mut config = CacheConfig::default();
        config.default_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl(_))));
    }

    #[test]
    fn jitter_outside_unit_interval_is_fatal() {
        let mut config = CacheConfig::default();
        config.ttl.jitter_factor = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidJitter(_))
        ));
    }

    #[test]
    fn compression_tier_bounds_are_checked() {
        let mut config = CacheConfig::default();
        config.compression.large_payload_bytes = config.compression.threshold_bytes;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCompression(_))
        ));
    }

    #[test]
    fn config_error_converts_to_cache_error() {
        let err: CacheError = ConfigError::InvalidJitter(2.0).into();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
}
