// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Used with `--no-cache` and in tests. Nothing survives the process, so
// every run starts with an empty cache and verifies all records live.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::state_store::{CacheEntry, RecordKey, StateStore};
use crate::Error;

/// In-memory state store implementation
///
/// Clones share the same map, so a test can keep a handle to a store that
/// was moved into the reconciler.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<RecordKey, CacheEntry>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_entries(entries: impl IntoIterator<Item = (RecordKey, CacheEntry)>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<CacheEntry>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &RecordKey, address: IpAddr) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(key.clone(), CacheEntry::new(address));
        Ok(())
    }

    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
