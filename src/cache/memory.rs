//! In-memory cache layer with lazy TTL expiry.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use super::pattern::matches_pattern;

/// A single cached value and the instant it stops being valid.
///
/// Entries are never mutated in place; a re-set replaces the whole entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// Process-local key/value store.
///
/// Expired entries are dropped on the read that notices them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Get a live value, evicting the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        if self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether `get` would return a value. Does not evict.
    pub fn has_valid(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remove every key selected by `pattern`, returning how many went.
    pub fn clear_pattern(&self, pattern: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let hit = matches_pattern(key, pattern);
            if hit {
                removed += 1;
            }
            !hit
        });
        removed
    }

    /// Drop every entry, expired or not.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the key is physically present, regardless of expiry.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
