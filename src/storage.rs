//! Key-value storage backends.
//!
//! The session layer works against two stores with different lifetimes:
//!
//! - a **durable** store that survives reloads and restarts (browser
//!   `localStorage`, [`JsonFileStorage`] on desktop)
//! - a **session-scoped** store that is discarded when the tab or process
//!   ends (browser `sessionStorage`, [`MemoryStorage`])
//!
//! Any backend that preserves those scoping semantics can implement [`Storage`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage backend failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Backend refused access (disabled storage, private browsing, poisoned lock).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Consumer-provided string key-value store.
///
/// # Example
///
/// ```rust,ignore
/// impl Storage for LocalStorageBackend {
///     fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
///         self.window_storage()?.get_item(key).map_err(unavailable)
///     }
///     // ...
/// }
/// ```
pub trait Storage {
    /// Read a value. Absent keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store.
///
/// Clones share the same map, so a test can keep a handle and inspect what the
/// session layer wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Durable store persisted as a single JSON object on disk.
///
/// Every write rewrites the whole file through a temp file and rename, so a
/// crash mid-write leaves either the old or the new contents. The store holds a
/// handful of short strings so this stays cheap.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Open (or lazily create) the store at `path`. The file is not touched
    /// until the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read for a read-modify-write cycle. A file that no longer decodes (torn
    /// by a crash, edited by hand) is discarded so writes keep working; the
    /// returned flag reports that.
    fn read_map_for_write(&self) -> Result<(HashMap<String, String>, bool), StorageError> {
        match self.read_map() {
            Ok(map) => Ok((map, false)),
            Err(StorageError::Serde(e)) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Discarding undecodable storage file");
                Ok((HashMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the file atomically: write a sibling temp file, then rename it
    /// over the old one.
    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(map)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.lock
            .lock()
            .map_err(|_| StorageError::Unavailable("file storage lock poisoned".into()))
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let (mut map, _) = self.read_map_for_write()?;
        map.insert(key.to_owned(), value.to_owned());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let (mut map, recovered) = self.read_map_for_write()?;
        if map.remove(key).is_some() || recovered {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_set_get_remove() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn memory_clones_share_entries() {
        let store = MemoryStorage::new();
        let handle = store.clone();
        store.set("access_token", "A").unwrap();
        assert_eq!(handle.get("access_token").unwrap().as_deref(), Some("A"));
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn memory_remove_absent_key_is_ok() {
        let store = MemoryStorage::new();
        assert!(store.remove("missing").is_ok());
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.json");

        let store = JsonFileStorage::new(&path);
        store.set("token_expiry", "1700000000000").unwrap();
        drop(store);

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(
            reopened.get("token_expiry").unwrap().as_deref(),
            Some("1700000000000")
        );
    }

    #[test]
    fn file_storage_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStorage::new(dir.path().join("absent.json"));
        assert_eq!(store.get("anything").unwrap(), None);
        assert!(store.remove("anything").is_ok());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_storage_corrupt_file_read_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileStorage::new(&path);
        assert!(matches!(store.get("k"), Err(StorageError::Serde(_))));
    }

    #[test]
    fn file_storage_recovers_from_torn_file_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, br#"{"access_tok"#).unwrap();

        let store = JsonFileStorage::new(&path);
        store.set("oauth_state", "xyz").unwrap();

        assert_eq!(store.get("oauth_state").unwrap().as_deref(), Some("xyz"));
        let on_disk: HashMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
    }

    #[test]
    fn file_storage_remove_repairs_torn_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, br#"{"access_tok"#).unwrap();

        let store = JsonFileStorage::new(&path);
        store.remove("access_token").unwrap();

        assert_eq!(store.get("access_token").unwrap(), None);
    }

    #[test]
    fn file_storage_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStorage::new(dir.path().join("auth.json"));
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
