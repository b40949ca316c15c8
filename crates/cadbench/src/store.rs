//! Key-value persistence for session state.
//!
//! [`MemoryStore`] keeps everything in process. [`FileStore`] mirrors its
//! entries into a JSON object on disk, rewritten atomically on every change.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The internal lock was poisoned by a panicking thread.
    #[error("Lock poisoned")]
    LockPoisoned,
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The state file is not a JSON object of strings.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

type Entries = RwLock<BTreeMap<String, String>>;

fn keys_with_prefix(entries: &Entries, prefix: &str) -> Result<Vec<String>, StoreError> {
    Ok(entries
        .read()
        .map_err(|_| StoreError::LockPoisoned)?
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect())
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Entries,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        keys_with_prefix(&self.entries, prefix)
    }
}

/// Store backed by a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Entries,
}

impl FileStore {
    /// Open `path`, loading its entries if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "session store opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the file from `entries`: temp file in the same directory, then rename.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&json)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Apply `f` and persist. Memory only changes once the file has been written.
    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut next = entries.clone();
        f(&mut next);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        keys_with_prefix(&self.entries, prefix)
    }
}

/// A [`FileStore`] at `path`, or a [`MemoryStore`] if no path is given.
pub fn open_store(path: Option<&Path>) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    Ok(match path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("ab", "2").unwrap();
        store.set("b", "3").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys("a").unwrap(), vec!["a", "ab"]);
        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        let store = FileStore::open(&path).unwrap();
        store.set("ns:1:code", "C 1 1 1\nRETURN 0").unwrap();
        store.set("ns:1:orig-hash", "abc").unwrap();
        store.remove("ns:1:orig-hash").unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            store.get("ns:1:code").unwrap().as_deref(),
            Some("C 1 1 1\nRETURN 0")
        );
        assert_eq!(store.get("ns:1:orig-hash").unwrap(), None);

        // Only the state file remains in its directory.
        let count = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_failed_write_leaves_entries_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::open(&path).unwrap();
        store.set("ns:a:last-good", "A").unwrap();

        // A non-empty directory in place of the state file cannot be replaced.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(store.set("ns:a:last-good", "B").is_err());
        assert_eq!(store.get("ns:a:last-good").unwrap().as_deref(), Some("A"));
        assert!(store.remove("ns:a:last-good").is_err());
        assert_eq!(store.get("ns:a:last-good").unwrap().as_deref(), Some("A"));
    }
}
