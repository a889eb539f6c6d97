//! In-memory connector for shared-tier tests
//!
//! Stands in for the network store: records every operation, and injects
//! connect or operation failures on demand so retry, circuit, and fallback
//! paths can be exercised deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::transport::{SharedConnection, SharedConnector};
use crate::cache::error::CacheError;

/// Shared state behind every mock connection
#[derive(Debug, Default)]
pub struct MockStore {
    entries: DashMap<String, Vec<u8>>,
    fail_ops: AtomicU32,
    fail_connects: AtomicU32,
    op_count: AtomicU64,
    connect_count: AtomicU64,
}

impl MockStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` operations fail with a retryable connection error
    pub fn fail_ops(&self, n: u32) {
        self.fail_ops.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Total operations that reached the store, failures included
    pub fn op_count(&self) -> u64 {
        self.op_count.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn insert_raw(&self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(key.into(), value);
    }

    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn consume_failure(&self) -> bool {
        self.fail_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Connector handing out connections onto one [`MockStore`]
#[derive(Debug)]
pub struct MockConnector {
    store: Arc<MockStore>,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SharedConnector for MockConnector {
    async fn connect(&self, _timeout: Duration) -> Result<Box<dyn SharedConnection>, CacheError> {
        self.store.connect_count.fetch_add(1, Ordering::SeqCst);
        if self
            .store
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CacheError::connection("injected connect failure"));
        }
        Ok(Box::new(MockConnection {
            store: self.store.clone(),
        }))
    }
}

struct MockConnection {
    store: Arc<MockStore>,
}

impl MockConnection {
    fn check(&self) -> Result<(), CacheError> {
        self.store.op_count.fetch_add(1, Ordering::SeqCst);
        if self.store.consume_failure() {
            Err(CacheError::connection("injected operation failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedConnection for MockConnection {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check()?;
        Ok(self.store.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&mut self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.store.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64, CacheError> {
        self.check()?;
        let mut removed = 0;
        for key in keys {
            if self.store.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&mut self) -> Result<(), CacheError> {
        self.check()
    }
}
