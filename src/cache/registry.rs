//! Cache registry - single authority over every cache layer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::{
    CacheStats, InvalidationMessage, InvalidationResult, MessageKind, PatternOutcome, now_millis,
};
use super::{CacheConfig, MemoryStore, SubscriberList, Subscription};
use crate::error::{CacheError, StorageError};
use crate::events::{BusinessEvent, EVENT_NAMES};
use crate::storage::StorageAdapter;
use crate::worker::{WorkerCacheAdapter, WorkerEvent, WorkerMessage};

/// Coordinates the in-memory store, persistent storage and the worker cache.
///
/// One registry is built at startup and shared behind an `Arc`. Every
/// invalidation goes through it so the three layers and all subscribers
/// see the same sequence.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = Arc::new(
///     CacheRegistry::new(Arc::new(MemoryStorage::new()))
///         .with_worker(Arc::new(WorkerCache::spawn(10_000))),
/// );
///
/// let _sub = registry.subscribe(|msg| println!("{:?} {}", msg.kind, msg.pattern));
/// registry.invalidate_by_business_event(&BusinessEvent::DailySync).await;
/// ```
pub struct CacheRegistry {
    memory: MemoryStore,
    storage: Arc<dyn StorageAdapter>,
    session: Option<Arc<dyn StorageAdapter>>,
    worker: Option<Arc<dyn WorkerCacheAdapter>>,
    subscribers: SubscriberList,
    config: CacheConfig,
}

impl CacheRegistry {
    /// Create a registry over the given persistent storage.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        info!("Cache registry initialized");
        Self {
            memory: MemoryStore::new(),
            storage,
            session: None,
            worker: None,
            subscribers: SubscriberList::new(),
            config: CacheConfig::default(),
        }
    }

    /// Attach session-scoped storage, wiped by `clear_all`.
    #[must_use]
    pub fn with_session_storage(mut self, session: Arc<dyn StorageAdapter>) -> Self {
        self.session = Some(session);
        self
    }

    /// Attach the worker-managed cache.
    #[must_use]
    pub fn with_worker(mut self, worker: Arc<dyn WorkerCacheAdapter>) -> Self {
        self.worker = Some(worker);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn session_storage(&self) -> Option<&Arc<dyn StorageAdapter>> {
        self.session.as_ref()
    }

    // --- in-memory layer ---

    /// Store a value in memory for `ttl`, replacing any previous entry.
    pub fn set_memory_cache(&self, key: &str, value: Value, ttl: Duration) {
        self.memory.set(key, value, ttl);
    }

    /// Store a value in memory for the configured default TTL.
    pub fn set_memory_cache_default(&self, key: &str, value: Value) {
        self.memory.set(key, value, self.config.default_ttl);
    }

    /// Get a live value from memory. Expired entries are evicted here.
    pub fn get_memory_cache(&self, key: &str) -> Option<Value> {
        self.memory.get(key)
    }

    pub fn has_valid_cache(&self, key: &str) -> bool {
        self.memory.has_valid(key)
    }

    pub fn clear_memory_pattern(&self, pattern: &str) -> usize {
        self.memory.clear_pattern(pattern)
    }

    // --- persistent layer ---

    /// Remove matching keys from persistent storage.
    ///
    /// Unavailable storage counts as zero deletions; other failures propagate.
    pub fn clear_storage_pattern(&self, pattern: &str) -> Result<usize, StorageError> {
        match self.storage.clear_pattern(pattern) {
            Ok(removed) => Ok(removed),
            Err(e) if e.is_unavailable() => {
                warn!("Skipping storage clear for '{}': {}", pattern, e);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Write a value to memory and persistent storage.
    pub fn set_cached(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let raw = serde_json::to_string(&value).map_err(StorageError::from)?;
        self.memory.set(key, value, ttl);
        match self.storage.set(key, &raw) {
            Err(e) if e.is_unavailable() => {
                warn!("Persisting '{}' skipped: {}", key, e);
                Ok(())
            }
            other => other.map_err(CacheError::from),
        }
    }

    /// Read a value from memory, falling back to persistent storage.
    ///
    /// A storage hit is promoted back into memory with the default TTL.
    pub fn get_cached(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if let Some(value) = self.memory.get(key) {
            return Ok(Some(value));
        }

        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) if e.is_unavailable() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_str(&raw).map_err(StorageError::from)?;
        self.memory.set(key, value.clone(), self.config.default_ttl);
        debug!("Promoted '{}' from storage", key);
        Ok(Some(value))
    }

    // --- invalidation ---

    /// Invalidate one pattern across every layer, then notify subscribers.
    ///
    /// The worker step is best-effort. A storage failure aborts the call
    /// before subscribers are told anything.
    pub async fn invalidate_pattern(
        &self,
        pattern: &str,
    ) -> Result<InvalidationResult, CacheError> {
        let memory_cleared = self.memory.clear_pattern(pattern);

        self.post_to_worker(WorkerMessage::invalidate_pattern(pattern)).await;

        let storage_cleared = self.clear_storage_pattern(pattern)?;

        debug!(
            "Invalidated '{}': memory={}, storage={}",
            pattern, memory_cleared, storage_cleared
        );

        self.notify_subscribers(&InvalidationMessage::invalidate(pattern));

        Ok(InvalidationResult {
            pattern: pattern.to_string(),
            memory_cleared,
            storage_cleared,
            timestamp: now_millis(),
        })
    }

    /// Invalidate every pattern an event maps to.
    ///
    /// A failing pattern becomes a `Failed` entry and the rest still run.
    /// Subscribers get one `business_event` message after all patterns.
    pub async fn invalidate_by_business_event(&self, event: &BusinessEvent) -> Vec<PatternOutcome> {
        self.run_event(event.name(), event.patterns(), event.payload()).await
    }

    /// String-keyed form of [`invalidate_by_business_event`].
    ///
    /// Unknown names return an empty list. `data` is echoed back to
    /// subscribers as `originalData` exactly as given.
    ///
    /// # Errors
    /// Returns error if the name is known but the payload lacks a field.
    ///
    /// [`invalidate_by_business_event`]: Self::invalidate_by_business_event
    pub async fn invalidate_by_event_name(
        &self,
        name: &str,
        data: Value,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        let event = match BusinessEvent::from_name(name, &data) {
            Ok(event) => event,
            Err(CacheError::UnknownEvent(name)) => {
                warn!("No invalidation patterns for business event '{}'", name);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(self.run_event(event.name(), event.patterns(), data).await)
    }

    async fn run_event(
        &self,
        name: &str,
        patterns: Vec<String>,
        original_data: Value,
    ) -> Vec<PatternOutcome> {
        info!("Business event '{}' -> {} patterns", name, patterns.len());

        let mut results = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match self.invalidate_pattern(&pattern).await {
                Ok(result) => results.push(PatternOutcome::Cleared(result)),
                Err(e) => {
                    error!("Invalidating '{}' for '{}' failed: {}", pattern, name, e);
                    results.push(PatternOutcome::Failed {
                        pattern,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.notify_subscribers(&InvalidationMessage::business_event(
            name,
            original_data,
            &results,
        ));

        results
    }

    /// Patterns an event invalidates. Pure.
    pub fn get_invalidation_patterns_for_event(&self, event: &BusinessEvent) -> Vec<String> {
        event.patterns()
    }

    /// Patterns for an event given by name; empty if unknown or malformed.
    pub fn patterns_for_event_name(&self, name: &str, data: &Value) -> Vec<String> {
        BusinessEvent::from_name(name, data)
            .map(|event| event.patterns())
            .unwrap_or_default()
    }

    /// Empty every layer and tell subscribers.
    ///
    /// Not scoped by pattern and not reversible. Only call on explicit
    /// user intent such as logout.
    pub async fn clear_all(&self) {
        self.memory.clear();

        if let Err(e) = self.storage.clear() {
            if e.is_unavailable() {
                warn!("Persistent storage not cleared: {}", e);
            } else {
                error!("Clearing persistent storage failed: {}", e);
            }
        }

        if let Some(session) = &self.session {
            if let Err(e) = session.clear() {
                warn!("Session storage not cleared: {}", e);
            }
        }

        self.post_to_worker(WorkerMessage::clear_all()).await;

        info!("All cache layers cleared");
        self.notify_subscribers(&InvalidationMessage::clear_all());
    }

    async fn post_to_worker(&self, message: WorkerMessage) {
        let Some(worker) = &self.worker else {
            debug!("No worker cache attached; skipping {:?}", message);
            return;
        };

        if let Err(e) = worker.post(message).await {
            warn!("Worker cache notification failed: {}", e);
        }
    }

    /// Forward worker-side invalidations to subscribers as `sw_invalidate`.
    ///
    /// Runs until the worker's event channel closes.
    pub fn relay_worker_events(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<WorkerEvent>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let message = InvalidationMessage::new(
                            MessageKind::SwInvalidate,
                            event.pattern,
                            Some(json!({ "removed": event.removed })),
                        );
                        registry.notify_subscribers(&message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Worker relay lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Worker relay stopped");
        })
    }

    // --- subscribers ---

    /// Register a callback for every invalidation message.
    ///
    /// The registration lives as long as the returned handle.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InvalidationMessage) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Deliver a message to every subscriber, isolating panics.
    pub fn notify_subscribers(&self, message: &InvalidationMessage) -> usize {
        self.subscribers.notify(message)
    }

    // --- stats ---

    /// Snapshot of the local layers.
    pub fn stats(&self) -> CacheStats {
        let storage_keys = match self.storage.keys() {
            Ok(keys) => keys.len(),
            Err(e) => {
                debug!("Storage keys unavailable for stats: {}", e);
                0
            }
        };

        CacheStats {
            memory_cache_size: self.memory.len(),
            subscriber_count: self.subscribers.len(),
            storage_keys,
            business_events: EVENT_NAMES.to_vec(),
            worker: None,
        }
    }

    /// Snapshot including the worker cache, if it answers in time.
    pub async fn stats_with_worker(&self) -> CacheStats {
        let mut stats = self.stats();

        if let Some(worker) = &self.worker {
            match worker.request_stats(self.config.worker_stats_timeout).await {
                Ok(worker_stats) => stats.worker = Some(worker_stats),
                Err(e) => warn!("Worker cache stats unavailable: {}", e),
            }
        }

        stats
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("memory_entries", &self.memory.len())
            .field("subscribers", &self.subscribers.len())
            .field("session_storage", &self.session.is_some())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::storage::{MemoryStorage, UnavailableStorage};
    use crate::worker::{WorkerCache, WorkerStats};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const TTL: Duration = Duration::from_secs(300);

    /// Storage whose pattern clear fails for one pattern, and optionally
    /// whose full clear fails too.
    #[derive(Default)]
    struct FailingStorage {
        inner: MemoryStorage,
        fail_on: String,
        fail_clear: bool,
    }

    impl StorageAdapter for FailingStorage {
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
        fn clear(&self) -> Result<(), StorageError> {
            if self.fail_clear {
                return Err(StorageError::Io(std::io::Error::other("read-only")));
            }
            self.inner.clear()
        }
        fn clear_pattern(&self, pattern: &str) -> Result<usize, StorageError> {
            if pattern == self.fail_on {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.clear_pattern(pattern)
        }
    }

    /// Worker that records posts and never answers stats.
    #[derive(Default)]
    struct RecordingWorker {
        posted: Mutex<Vec<WorkerMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl WorkerCacheAdapter for RecordingWorker {
        async fn post(&self, message: WorkerMessage) -> Result<(), WorkerError> {
            self.posted.lock().push(message);
            if self.fail {
                return Err(WorkerError::ChannelClosed);
            }
            Ok(())
        }

        async fn request_stats(&self, timeout: Duration) -> Result<WorkerStats, WorkerError> {
            tokio::time::sleep(timeout).await;
            Err(WorkerError::Timeout(timeout))
        }
    }

    fn registry() -> CacheRegistry {
        CacheRegistry::new(Arc::new(MemoryStorage::new()))
    }

    fn collect(registry: &CacheRegistry) -> (Arc<Mutex<Vec<InvalidationMessage>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = registry.subscribe(move |msg| sink.lock().push(msg.clone()));
        (seen, sub)
    }

    #[test]
    fn test_memory_roundtrip_and_expiry() {
        let registry = registry();
        registry.set_memory_cache("dashboard_data", json!({"total": 3}), TTL);
        assert_eq!(registry.get_memory_cache("dashboard_data"), Some(json!({"total": 3})));

        registry.set_memory_cache("short", json!(1), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!registry.has_valid_cache("short"));
        assert_eq!(registry.get_memory_cache("short"), None);
        assert_eq!(registry.stats().memory_cache_size, 1);
    }

    #[test]
    fn test_clear_memory_pattern() {
        let registry = registry();
        registry.set_memory_cache("compliance_dashboard", json!(1), TTL);
        registry.set_memory_cache("compliance_check_123", json!(2), TTL);
        registry.set_memory_cache("user_prefs", json!(3), TTL);

        assert_eq!(registry.clear_memory_pattern("compliance_"), 2);
        assert!(registry.has_valid_cache("user_prefs"));
    }

    #[test]
    fn test_unavailable_storage_counts_as_zero() {
        let registry = CacheRegistry::new(Arc::new(UnavailableStorage::new("offline")));
        assert_eq!(registry.clear_storage_pattern("invoice_").unwrap(), 0);
        assert_eq!(registry.stats().storage_keys, 0);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_clears_layers_and_notifies() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("invoices_list", "[]").unwrap();
        storage.set("invoices_20111", "[]").unwrap();
        let worker = Arc::new(RecordingWorker::default());
        let registry = CacheRegistry::new(storage.clone()).with_worker(worker.clone());
        registry.set_memory_cache("invoices_list", json!([]), TTL);
        let (seen, _sub) = collect(&registry);

        let result = registry.invalidate_pattern("invoices_list").await.unwrap();

        assert_eq!(result.pattern, "invoices_list");
        assert_eq!(result.memory_cleared, 1);
        assert_eq!(result.storage_cleared, 1);
        assert_eq!(storage.keys().unwrap(), vec!["invoices_20111".to_string()]);
        assert!(matches!(
            worker.posted.lock()[0],
            WorkerMessage::InvalidatePattern { ref pattern, .. } if pattern == "invoices_list"
        ));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MessageKind::Invalidate);
        assert_eq!(seen[0].pattern, "invoices_list");
        assert_eq!(seen[0].data, None);
    }

    #[tokio::test]
    async fn test_worker_failure_is_not_fatal() {
        let worker = Arc::new(RecordingWorker {
            fail: true,
            ..Default::default()
        });
        let registry = registry().with_worker(worker);

        assert!(registry.invalidate_pattern("dashboard_data").await.is_ok());
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_without_notifying() {
        let storage = Arc::new(FailingStorage {
            inner: MemoryStorage::new(),
            fail_on: "contributors_list".to_string(),
            ..Default::default()
        });
        let registry = CacheRegistry::new(storage);
        let (seen, _sub) = collect(&registry);

        let err = registry.invalidate_pattern("contributors_list").await.unwrap_err();
        assert!(matches!(err, CacheError::Storage(StorageError::Io(_))));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_business_event_isolates_failing_pattern() {
        let storage = Arc::new(FailingStorage {
            inner: MemoryStorage::new(),
            fail_on: "contributors_list".to_string(),
            ..Default::default()
        });
        let registry = CacheRegistry::new(storage);
        let (seen, _sub) = collect(&registry);
        let event = BusinessEvent::ContributorUpdated {
            cuit: "20999888777".to_string(),
        };

        let results = registry.invalidate_by_business_event(&event).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_failed());
        assert!(results[1].is_failed());
        assert_eq!(results[1].pattern(), "contributors_list");
        assert!(!results[2].is_failed());

        let seen = seen.lock();
        // two per-pattern invalidations plus the event summary
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].kind, MessageKind::BusinessEvent);
        assert_eq!(seen[2].pattern, "contributor_updated");
    }

    #[tokio::test]
    async fn test_unknown_event_name() {
        let registry = registry();
        let (seen, _sub) = collect(&registry);

        let results = registry
            .invalidate_by_event_name("unknown_event", Value::Null)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(seen.lock().is_empty());
        assert!(registry.patterns_for_event_name("unknown_event", &Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let registry = registry();
        let err = registry
            .invalidate_by_event_name("compliance_check_completed", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidPayload { field: "cuit", .. }));
    }

    #[tokio::test]
    async fn test_event_name_echoes_original_data() {
        let registry = registry();
        let (seen, _sub) = collect(&registry);
        let data = json!({ "cuit": "20123456789", "source": "upload" });

        registry
            .invalidate_by_event_name("compliance_check_completed", data.clone())
            .await
            .unwrap();

        let seen = seen.lock();
        let summary = seen.last().unwrap();
        assert_eq!(summary.data.as_ref().unwrap()["originalData"], data);
    }

    #[test]
    fn test_patterns_for_event() {
        let registry = registry();
        let event = BusinessEvent::ComplianceCheckCompleted {
            cuit: "20123456789".to_string(),
        };
        assert_eq!(
            registry.get_invalidation_patterns_for_event(&event),
            vec![
                "compliance_20123456789",
                "compliance_dashboard",
                "compliance_check_20123456789",
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_all() {
        let storage = Arc::new(MemoryStorage::new());
        let session = Arc::new(MemoryStorage::new());
        storage.set("user_prefs", "{}").unwrap();
        session.set("session_id", "abc").unwrap();
        let worker = Arc::new(RecordingWorker::default());
        let registry = CacheRegistry::new(storage.clone())
            .with_session_storage(session.clone())
            .with_worker(worker.clone());
        registry.set_memory_cache("a", json!(1), TTL);
        registry.set_memory_cache("b", json!(2), TTL);
        let (seen, _sub) = collect(&registry);

        registry.clear_all().await;

        assert_eq!(registry.stats().memory_cache_size, 0);
        assert!(storage.is_empty());
        assert!(session.is_empty());
        assert!(matches!(worker.posted.lock()[0], WorkerMessage::ClearAllCaches { .. }));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MessageKind::ClearAll);
        assert_eq!(seen[0].pattern, "*");
    }

    #[tokio::test]
    async fn test_clear_all_survives_storage_failures() {
        let session = Arc::new(FailingStorage {
            fail_clear: true,
            ..Default::default()
        });
        session.inner.set("session_id", "abc").unwrap();
        let worker = Arc::new(RecordingWorker::default());
        let registry = CacheRegistry::new(Arc::new(UnavailableStorage::new("offline")))
            .with_session_storage(session.clone())
            .with_worker(worker.clone());
        registry.set_memory_cache("dashboard_data", json!(1), TTL);
        let (seen, _sub) = collect(&registry);

        registry.clear_all().await;

        assert!(!registry.has_valid_cache("dashboard_data"));
        assert_eq!(registry.stats().memory_cache_size, 0);
        assert_eq!(worker.posted.lock().len(), 1);
        assert!(matches!(worker.posted.lock()[0], WorkerMessage::ClearAllCaches { .. }));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MessageKind::ClearAll);
        assert_eq!(seen[0].pattern, "*");
    }

    #[tokio::test]
    async fn test_clear_all_with_failing_persistent_clear() {
        let storage = Arc::new(FailingStorage {
            fail_clear: true,
            ..Default::default()
        });
        let session = Arc::new(MemoryStorage::new());
        session.set("auth_token", "abc").unwrap();
        let registry = CacheRegistry::new(storage).with_session_storage(session.clone());
        registry.set_memory_cache("user_prefs", json!({}), TTL);
        let (seen, _sub) = collect(&registry);

        registry.clear_all().await;

        assert_eq!(registry.stats().memory_cache_size, 0);
        assert!(session.is_empty());
        assert_eq!(seen.lock().last().map(|m| m.kind), Some(MessageKind::ClearAll));
    }

    #[tokio::test]
    async fn test_concurrent_events_over_shared_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let keys = [
            "invoice_7",
            "invoices_list",
            "invoices_20111",
            "compliance_20111",
            "compliance_dashboard",
            "contributors_list",
            "dashboard_data",
        ];
        let registry = CacheRegistry::new(storage.clone());
        for key in keys {
            registry.set_memory_cache(key, json!(key), TTL);
            storage.set(key, "{}").unwrap();
        }
        registry.set_memory_cache("user_prefs", json!({}), TTL);
        storage.set("user_prefs", "{}").unwrap();
        let (seen, _sub) = collect(&registry);

        let invoice = BusinessEvent::InvoiceProcessed {
            invoice_id: "7".to_string(),
            cuit: "20111".to_string(),
        };
        let (first, second) = tokio::join!(
            registry.invalidate_by_business_event(&invoice),
            registry.invalidate_by_business_event(&BusinessEvent::DailySync),
        );

        let (mut memory, mut stored) = (0, 0);
        for outcome in first.iter().chain(second.iter()) {
            if let PatternOutcome::Cleared(result) = outcome {
                memory += result.memory_cleared;
                stored += result.storage_cleared;
            }
        }

        // Shared patterns are counted by whichever event got there first.
        assert_eq!(memory, keys.len());
        assert_eq!(stored, keys.len());
        assert_eq!(first.len() + second.len(), 9);
        assert_eq!(registry.stats().memory_cache_size, 1);
        assert_eq!(storage.keys().unwrap(), vec!["user_prefs".to_string()]);

        let seen = seen.lock();
        let summaries: Vec<&str> = seen
            .iter()
            .filter(|m| m.kind == MessageKind::BusinessEvent)
            .map(|m| m.pattern.as_str())
            .collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.contains(&"invoice_processed"));
        assert!(summaries.contains(&"daily_sync"));
    }

    #[test]
    fn test_set_cached_with_unbounded_ttl() {
        let registry = registry();
        registry
            .set_cached("user_settings_42", json!({"lang": "es"}), Duration::MAX)
            .unwrap();
        assert_eq!(
            registry.get_cached("user_settings_42").unwrap(),
            Some(json!({"lang": "es"}))
        );
    }

    #[test]
    fn test_cached_falls_back_to_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("contributor_20111", r#"{"name":"ACME"}"#).unwrap();
        let registry = CacheRegistry::new(storage.clone());

        let value = registry.get_cached("contributor_20111").unwrap();
        assert_eq!(value, Some(json!({"name": "ACME"})));
        assert!(registry.has_valid_cache("contributor_20111"));

        registry.set_cached("invoice_7", json!({"total": 10}), TTL).unwrap();
        assert_eq!(storage.get("invoice_7").unwrap().as_deref(), Some(r#"{"total":10}"#));
    }

    #[test]
    fn test_stats() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("k", "v").unwrap();
        let registry = CacheRegistry::new(storage);
        registry.set_memory_cache("m", json!(null), TTL);
        let _sub = registry.subscribe(|_| {});

        let stats = registry.stats();
        assert_eq!(stats.memory_cache_size, 1);
        assert_eq!(stats.subscriber_count, 1);
        assert_eq!(stats.storage_keys, 1);
        assert_eq!(stats.business_events.len(), 9);
        assert!(stats.business_events.contains(&"daily_sync"));
    }

    #[tokio::test]
    async fn test_stats_with_worker_timeout() {
        let registry = registry()
            .with_worker(Arc::new(RecordingWorker::default()))
            .with_config(CacheConfig::default().worker_stats_timeout(Duration::from_millis(20)));

        let stats = registry.stats_with_worker().await;
        assert_eq!(stats.worker, None);
    }

    #[tokio::test]
    async fn test_stats_with_live_worker() {
        let worker = WorkerCache::spawn(100);
        worker.put("invoices_list", "[]").unwrap();
        let registry = registry().with_worker(Arc::new(worker));

        let stats = registry.stats_with_worker().await;
        assert_eq!(stats.worker.map(|w| w.entries), Some(1));
    }

    #[tokio::test]
    async fn test_worker_events_relayed() {
        let worker = WorkerCache::spawn(100);
        worker.put("compliance_dashboard", "x").unwrap();
        let registry = Arc::new(registry().with_worker(Arc::new(worker.clone())));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = registry.subscribe(move |msg| {
            if msg.kind == MessageKind::SwInvalidate {
                let _ = tx.send(msg.clone());
            }
        });
        let _relay = registry.relay_worker_events(worker.subscribe());

        registry.invalidate_pattern("compliance_").await.unwrap();

        let relayed = rx.recv().await.unwrap();
        assert_eq!(relayed.pattern, "compliance_");
        assert_eq!(relayed.data, Some(json!({ "removed": 1 })));
    }
}
