// # State Store Trait
//
// Defines the interface for the advisory address cache.
//
// ## Purpose
//
// The cache remembers the last address confirmed at the provider for each
// (fqdn, record type). It is a hint: a miss, a stale entry, or a corrupt
// backing file must never block reconciliation.
//
// ## Implementations
//
// - File-based: `FileStateStore` (JSON, atomic writes)
// - In-memory: `MemoryStateStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::config::RecordType;

/// Cache key: one entry per (fqdn, record type)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub fqdn: String,
    pub record_type: RecordType,
}

impl RecordKey {
    pub fn new(fqdn: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            fqdn: fqdn.into(),
            record_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.fqdn, self.record_type)
    }
}

/// Cached state for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Last address confirmed at the provider
    pub address: IpAddr,
    /// When it was confirmed
    pub last_updated: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    ///
    /// `pub(crate)` so entries only originate from confirmed writes inside
    /// the store implementations.
    pub(crate) fn new(address: IpAddr) -> Self {
        Self {
            address,
            last_updated: Utc::now(),
        }
    }

    /// Check if the entry is older than `max_age`
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.last_updated) > max_age
    }
}

/// Trait for state store implementations
///
/// # Guidelines
///
/// - `get` never fails because of missing or unreadable persisted state;
///   implementations degrade to a miss when loading
/// - `put` is called only after the provider confirmed the address
/// - `flush` persists anything still buffered
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the cached entry for a record
    ///
    /// # Returns
    ///
    /// - `Ok(Some(CacheEntry))`: Cached entry
    /// - `Ok(None)`: Cache miss
    async fn get(&self, key: &RecordKey) -> Result<Option<CacheEntry>, crate::Error>;

    /// Record a confirmed address for a record
    async fn put(&self, key: &RecordKey, address: IpAddr) -> Result<(), crate::Error>;

    /// Number of cached entries
    async fn len(&self) -> usize;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
