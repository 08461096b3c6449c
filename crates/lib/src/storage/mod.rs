//! Durable key/value storage for local UI state.
//!
//! This is process-local convenience storage (expansion state and the like),
//! never collaborative state: it is not synchronized across clients and plays
//! no part in the document's conflict model. The `FileStore` persists the
//! whole map as one JSON document, the same shape the in-memory variant holds.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::Result;

/// Durable string key/value storage.
///
/// Values are opaque to the store; callers serialize their own formats into
/// them. Reads of absent keys return `None` rather than erroring so first-use
/// bootstrapping needs no special casing.
pub trait SettingsStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: String) -> Result<()>;

    /// Removes the value stored under `key`. Succeeds if the key is absent.
    fn remove(&self, key: &str) -> Result<()>;
}

/// A simple in-memory settings store using a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new, empty `InMemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

/// A file-backed settings store.
///
/// The entire map is serialized to a single JSON file on every mutation and
/// loaded once at open. A missing file is treated as an empty store; a file
/// that exists but fails to parse is a hard error, since silently recovering
/// from corrupt local storage would mask a real storage-layer bug.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or creates) a file-backed store at `path`.
    ///
    /// # Returns
    /// A `Result` containing the store, or an I/O or deserialization error if
    /// the file exists but cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Writes the current map to disk. Called under the write lock so
    /// mutations persist in the order they were applied.
    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key);
        self.flush(&entries)
    }
}
