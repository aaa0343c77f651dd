//! Volatile storage backends.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::StorageAdapter;
use crate::error::StorageError;

/// Storage held in process memory.
///
/// Used for session-scoped storage and as a stand-in for the persistent
/// store when no file path is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl StorageAdapter for MemoryStorage {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.read().keys().cloned().collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.items.write().clear();
        Ok(())
    }
}

/// Storage that cannot be reached. Every call reports `Unavailable`.
#[derive(Debug, Clone)]
pub struct UnavailableStorage {
    reason: String,
}

impl UnavailableStorage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn err(&self) -> StorageError {
        StorageError::Unavailable(self.reason.clone())
    }
}

impl StorageAdapter for UnavailableStorage {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(self.err())
    }

    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(self.err())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(self.err())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(self.err())
    }

    fn clear(&self) -> Result<(), StorageError> {
        Err(self.err())
    }
}
