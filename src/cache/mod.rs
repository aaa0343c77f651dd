//! Cache module - layered cache registry.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Owns the in-memory store and the subscriber list,
//!   and drives persistent storage and the worker cache on invalidation
//! - `MemoryStore` - Process-local entries with lazy TTL expiry
//! - `SubscriberList` / `Subscription` - Handle-based notification
//! - `pattern` - Prefix / substring key selection shared by every layer
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(CacheRegistry::new(storage).with_worker(worker));
//!
//! registry.set_memory_cache("contributors_list", json!([]), Duration::from_secs(300));
//! registry.invalidate_pattern("contributors_").await?;
//! ```

mod config;
mod memory;
mod message;
mod pattern;
mod registry;
mod subscribers;

pub use config::CacheConfig;
pub use memory::MemoryStore;
pub use message::{
    CacheStats, InvalidationMessage, InvalidationResult, MessageKind, PatternOutcome, now_millis,
};
pub use pattern::{MATCH_ALL, PREFIX_SEPARATOR, is_prefix_pattern, matches_pattern};
pub use registry::CacheRegistry;
pub use subscribers::{Subscriber, SubscriberList, Subscription};
