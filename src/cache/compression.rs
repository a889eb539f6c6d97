//! Compression strategy selector
//!
//! Picks an algorithm by payload size tier: small payloads stay raw, medium
//! payloads get LZ4 for speed, large payloads get Zstd for ratio. The chosen
//! algorithm travels with the entry so any process can decode it later.
//! Per-call ratios feed the metrics collector for offline threshold tuning.

use std::sync::Arc;

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::cache::config::CompressionConfig;
use crate::cache::error::CacheError;
use crate::cache::telemetry::CacheMetrics;
use crate::cache::types::CompressionAlgorithm;

/// Compression codec; immutable after construction
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    enabled: bool,
    threshold_bytes: usize,
    large_payload_bytes: usize,
    zstd_level: i32,
    metrics: Arc<CacheMetrics>,
}

impl CompressionCodec {
    pub fn new(config: &CompressionConfig, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            enabled: config.enabled,
            threshold_bytes: config.threshold_bytes,
            large_payload_bytes: config.large_payload_bytes,
            zstd_level: config.zstd_level,
            metrics,
        }
    }

    /// Algorithm the selector would choose for a payload of this size
    pub fn select(&self, payload_len: usize) -> CompressionAlgorithm {
        if !self.enabled || payload_len <= self.threshold_bytes {
            CompressionAlgorithm::None
        } else if payload_len < self.large_payload_bytes {
            CompressionAlgorithm::Lz4
        } else {
            CompressionAlgorithm::Zstd
        }
    }

    /// Encode a payload, returning the stored bytes and the recorded algorithm
    ///
    /// Encoding never fails the write: a compressor error or an output that
    /// does not shrink the payload falls back to raw storage.
    pub fn encode(&self, payload: &[u8]) -> (Vec<u8>, CompressionAlgorithm) {
        let algorithm = self.select(payload.len());
        let compressed = match algorithm {
            CompressionAlgorithm::None => return (payload.to_vec(), CompressionAlgorithm::None),
            CompressionAlgorithm::Lz4 => Some(compress_prepend_size(payload)),
            CompressionAlgorithm::Zstd => match zstd::bulk::compress(payload, self.zstd_level) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("zstd compression failed, storing raw: {}", e);
                    None
                }
            },
        };

        match compressed {
            Some(bytes) if bytes.len() < payload.len() => {
                self.metrics
                    .record_compression(payload.len() as u64, bytes.len() as u64);
                (bytes, algorithm)
            }
            // Incompressible or failed: raw wins
            _ => {
                self.metrics
                    .record_compression(payload.len() as u64, payload.len() as u64);
                (payload.to_vec(), CompressionAlgorithm::None)
            }
        }
    }

    /// Decode stored bytes using the algorithm recorded with the entry
    pub fn decode(
        &self,
        bytes: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<Vec<u8>, CacheError> {
        match algorithm {
            CompressionAlgorithm::None => Ok(bytes.to_vec()),
            CompressionAlgorithm::Lz4 => decompress_size_prepended(bytes)
                .map_err(|e| CacheError::compression(format!("lz4: {}", e))),
            CompressionAlgorithm::Zstd => zstd::stream::decode_all(bytes)
                .map_err(|e| CacheError::compression(format!("zstd: {}", e))),
        }
    }
}
