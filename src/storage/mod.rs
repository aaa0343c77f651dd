//! Persistent key/value storage adapters.
//!
//! The registry only needs string keys and string values. Keys double as
//! cache patterns, so pattern clears work on the same key space.

mod file;
mod memory;

pub use file::JsonFileStorage;
pub use memory::{MemoryStorage, UnavailableStorage};

use crate::cache::matches_pattern;
use crate::error::StorageError;

/// Synchronous key/value store.
pub trait StorageAdapter: Send + Sync {
    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    /// Remove every key selected by `pattern`, returning how many went.
    fn clear_pattern(&self, pattern: &str) -> Result<usize, StorageError> {
        let doomed: Vec<String> = self
            .keys()?
            .into_iter()
            .filter(|key| matches_pattern(key, pattern))
            .collect();

        for key in &doomed {
            self.remove(key)?;
        }
        Ok(doomed.len())
    }
}
