//! Connector and connection seams for the shared tier
//!
//! The pool and client are written against these object-safe traits so any
//! RESP-compatible store works in production and tests inject an in-memory
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::resp::RespConnection;
use crate::cache::error::CacheError;

/// A single logical connection to the shared store
#[async_trait]
pub trait SharedConnection: Send {
    /// Fetch the stored bytes for a key
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store bytes under a key with a millisecond-resolution expiry
    async fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Delete a batch of keys; returns how many existed
    async fn delete(&mut self, keys: &[String]) -> Result<u64, CacheError>;

    /// Liveness probe
    async fn ping(&mut self) -> Result<(), CacheError>;
}

/// Factory for shared-store connections
#[async_trait]
pub trait SharedConnector: Send + Sync + std::fmt::Debug {
    /// Establish a connection, bounded by the connect timeout
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn SharedConnection>, CacheError>;
}

/// TCP connector speaking the RESP2 subset the client needs
#[derive(Debug)]
pub struct RespConnector {
    endpoint: String,
}

impl RespConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SharedConnector for RespConnector {
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn SharedConnection>, CacheError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&self.endpoint))
            .await
            .map_err(|_| CacheError::timeout(format!("connect to {}", self.endpoint)))?
            .map_err(|e| CacheError::connection(format!("{}: {}", self.endpoint, e)))?;
        // Small command/reply exchanges; coalescing only adds latency
        let _ = stream.set_nodelay(true);
        Ok(Box::new(RespConnection::new(stream)))
    }
}
