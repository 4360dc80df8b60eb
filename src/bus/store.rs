//! Backing stores for the signal bus.
//!
//! The bus only needs get/set of an opaque string payload. `MemoryStore`
//! backs a single process; a remote store (shared between engines) plugs
//! in through the same trait. TTL expiry is enforced logically at the bus
//! layer, so stores never have to garbage-collect.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store operation timed out")]
    Timeout,
}

/// Key-value backing store for the signal bus.
///
/// Both calling conventions must observe the same data: a payload written
/// through `set` is visible to `get_blocking` and vice versa. Blocking
/// implementations carry their own connect/read timeouts so no call can
/// stall a decision loop indefinitely.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn set(&self, key: &str, payload: String) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_blocking(&self, key: &str, payload: String) -> Result<(), StoreError>;
    fn get_blocking(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// In-process store - the default for single-host deployments and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn set(&self, key: &str, payload: String) -> Result<(), StoreError> {
        self.set_blocking(key, payload)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_blocking(key)
    }

    fn set_blocking(&self, key: &str, payload: String) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), payload);
        Ok(())
    }

    fn get_blocking(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }
}
