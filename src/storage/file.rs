//! JSON file backed storage.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::StorageAdapter;
use crate::error::StorageError;

/// Key/value store persisted as a single JSON object on disk.
///
/// The whole map is kept in memory and rewritten after every mutation.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    items: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStorage {
    /// Open the store at `path`, loading existing contents if the file exists.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let items = if path.exists() {
            let raw = fs::read(&path)?;
            if raw.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&raw)?
            }
        } else {
            BTreeMap::new()
        };

        info!("Opened storage at {} ({} keys)", path.display(), items.len());

        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(items)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted {} keys to {}", items.len(), self.path.display());
        Ok(())
    }

    /// Apply `change` to a copy of the map, persist it, then publish it.
    ///
    /// `change` returns whether anything changed. A failed write leaves the
    /// visible map untouched.
    fn commit<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut items = self.items.write();
        let mut next = items.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *items = next;
        Ok(())
    }
}

impl StorageAdapter for JsonFileStorage {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.read().keys().cloned().collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.commit(|items| {
            items.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.commit(|items| items.remove(key).is_some())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.commit(|items| {
            items.clear();
            true
        })
    }

    fn clear_pattern(&self, pattern: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        self.commit(|items| {
            let before = items.len();
            items.retain(|key, _| !crate::cache::matches_pattern(key, pattern));
            removed = before - items.len();
            removed > 0
        })?;
        Ok(removed)
    }
}
