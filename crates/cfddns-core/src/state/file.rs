// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Remembers the last confirmed address per record across runs so that the
// reconciler can log and, in `trust_cache` mode, skip provider reads.
//
// ## Failure Policy
//
// The cache is advisory. Loading never fails:
// - Missing file: empty cache
// - Corrupt JSON: try the `.backup` copy, then empty cache
// - Unreadable file: empty cache
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of last known good state
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "vpn.example.com/A": {
//       "address": "1.2.3.4",
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```
//
// Unknown keys are ignored and missing keys default, so older and newer
// files load.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{CacheEntry, RecordKey, StateStore};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use cfddns_core::config::RecordType;
/// use cfddns_core::state::FileStateStore;
/// use cfddns_core::traits::{RecordKey, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::open("/var/cache/cloudflare-ddns/state.json").await;
///     let key = RecordKey::new("vpn.example.com", RecordType::A);
///
///     // Atomically written to disk
///     store.put(&key, "1.2.3.4".parse()?).await?;
///
///     let entry = store.get(&key).await?;
///     assert_eq!(entry.map(|e| e.address), Some("1.2.3.4".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

/// Internal state for file-based store
#[derive(Debug, Default)]
struct FileState {
    records: HashMap<String, CacheEntry>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct StateFileFormat {
    version: String,
    records: HashMap<String, CacheEntry>,
}

impl FileStateStore {
    /// Open the cache file at `path`
    ///
    /// This will:
    /// 1. Try to load the existing state file
    /// 2. If corruption is detected, try to load from backup
    /// 3. If both fail, start with empty state
    ///
    /// Parent directories are created on first write.
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = Self::load_state_with_recovery(&path).await;

        Self {
            path,
            state: RwLock::new(FileState {
                records,
                dirty: false,
            }),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file, degrading to an empty cache
    async fn load_state_with_recovery(path: &Path) -> HashMap<String, CacheEntry> {
        match Self::load_state(path).await {
            Ok(records) => {
                tracing::debug!("Loaded cache from {}: {} records", path.display(), records.len());
                records
            }
            Err(LoadError::Unreadable(e)) => {
                tracing::warn!("{}. Starting with empty cache.", e);
                HashMap::new()
            }
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!("Cache file appears corrupted: {}. Attempting recovery from backup.", e);

                let backup_path = Self::backup_path(path);
                match Self::load_state(&backup_path).await {
                    Ok(records) if backup_path.exists() => {
                        tracing::info!("Recovered cache from backup: {} records", records.len());
                        records
                    }
                    Ok(_) => {
                        tracing::warn!("No backup file found. Starting with empty cache.");
                        HashMap::new()
                    }
                    Err(backup_err) => {
                        tracing::warn!(
                            "Backup also unusable: {}. Starting with empty cache.",
                            backup_err
                        );
                        HashMap::new()
                    }
                }
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<HashMap<String, CacheEntry>, LoadError> {
        if !path.exists() {
            tracing::debug!("Cache file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(format!("Failed to read cache file {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(format!("Failed to parse cache file {}: {}", path.display(), e))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "Cache file version mismatch: expected {}, got {:?}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.records)
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            records: state_guard.records.clone(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize cache: {}", e)))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create cache backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state_guard.dirty = false;
        tracing::trace!("Cache written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

/// Why a cache file could not be loaded
#[derive(Debug)]
enum LoadError {
    Unreadable(String),
    Corrupt(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Unreadable(msg) | LoadError::Corrupt(msg) => f.write_str(msg),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<CacheEntry>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.records.get(&key.to_string()).cloned())
    }

    async fn put(&self, key: &RecordKey, address: IpAddr) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            state_guard
                .records
                .insert(key.to_string(), CacheEntry::new(address));
            state_guard.dirty = true;
        }

        // Immediate write so an interrupted run keeps confirmed entries
        self.write_state().await
    }

    async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
