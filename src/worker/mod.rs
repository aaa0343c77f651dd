//! Worker-managed cache reachable only through message passing.
//!
//! The registry never touches the worker's storage directly. It posts a
//! [`WorkerMessage`] and, for stats, waits a bounded time for a reply.

mod cache;

pub use cache::{WorkerCache, WorkerEvent};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::now_millis;
use crate::error::WorkerError;

/// Outbound message understood by the worker cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    InvalidatePattern { pattern: String, timestamp: i64 },
    ClearAllCaches { timestamp: i64 },
    GetCacheStats { timestamp: i64 },
    PutEntry {
        key: String,
        value: String,
        timestamp: i64,
    },
}

impl WorkerMessage {
    pub fn invalidate_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidatePattern {
            pattern: pattern.into(),
            timestamp: now_millis(),
        }
    }

    pub fn clear_all() -> Self {
        Self::ClearAllCaches {
            timestamp: now_millis(),
        }
    }

    pub fn get_stats() -> Self {
        Self::GetCacheStats {
            timestamp: now_millis(),
        }
    }

    pub fn put_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::PutEntry {
            key: key.into(),
            value: value.into(),
            timestamp: now_millis(),
        }
    }
}

/// Stats reply carried back from the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub entries: u64,
    pub invalidations: u64,
}

/// Channel to a worker-managed cache.
#[async_trait]
pub trait WorkerCacheAdapter: Send + Sync {
    /// Fire-and-forget delivery of a message.
    async fn post(&self, message: WorkerMessage) -> Result<(), WorkerError>;

    /// Ask for stats and wait at most `timeout` for the reply.
    async fn request_stats(&self, timeout: Duration) -> Result<WorkerStats, WorkerError>;
}
