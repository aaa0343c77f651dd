//! Error types for the cache layers.

use std::time::Duration;

/// Errors raised by a persistent key/value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The store cannot be reached at all (disabled, quota, not mounted).
    /// Callers treat this as a zero-effect layer rather than a failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while talking to the worker-managed cache.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker cache channel is not available")]
    Unavailable,

    #[error("Worker cache channel closed")]
    ChannelClosed,

    #[error("Worker cache did not reply within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by the registry and the invalidation hook.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalidation hook is not bound to a registry")]
    Unbound,

    #[error("Unknown business event: {0}")]
    UnknownEvent(String),

    #[error("Business event '{event}' is missing field '{field}'")]
    InvalidPayload { event: String, field: &'static str },
}

impl StorageError {
    /// Whether this error means "layer absent" rather than "operation failed".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
