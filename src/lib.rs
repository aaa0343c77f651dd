//! arca-cache - Layered cache invalidation for the ARCA invoicing dashboard.
//!
//! Business events (a contributor saved, an invoice processed, a logout...)
//! are translated into cache-key patterns, and every pattern is cleared from
//! three independent layers before interested consumers are told to re-fetch.
//!
//! ## Architecture
//!
//! - `cache` - `CacheRegistry`, the in-memory layer, pattern matching, subscribers
//! - `events` - Business events and their pattern tables
//! - `storage` - Persistent key/value adapters
//! - `worker` - Message-driven worker cache (Moka-backed)
//! - `hook` - Per-scope façade with logout and refresh helpers
//! - `config` - Environment configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod hook;
pub mod storage;
pub mod worker;

pub use cache::{CacheConfig, CacheRegistry, InvalidationMessage, MessageKind, Subscription};
pub use error::{CacheError, StorageError, WorkerError};
pub use events::BusinessEvent;
pub use hook::{HookState, InvalidationHook};
pub use storage::{JsonFileStorage, MemoryStorage, StorageAdapter};
pub use worker::{WorkerCache, WorkerCacheAdapter};
