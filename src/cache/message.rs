//! Values handed to subscribers and returned from invalidation calls.

use serde::Serialize;
use serde_json::{Value, json};

use crate::worker::WorkerStats;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What kind of invalidation a message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Invalidate,
    BusinessEvent,
    ClearAll,
    /// Relayed from the worker cache rather than produced locally.
    SwInvalidate,
}

/// Notification delivered to every subscriber.
///
/// Built fresh for each notification; subscribers get a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidationMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub pattern: String,
    pub data: Option<Value>,
    pub timestamp: i64,
}

impl InvalidationMessage {
    pub fn invalidate(pattern: impl Into<String>) -> Self {
        Self::new(MessageKind::Invalidate, pattern, None)
    }

    pub fn business_event(
        event: impl Into<String>,
        original_data: Value,
        results: &[PatternOutcome],
    ) -> Self {
        let data = json!({
            "originalData": original_data,
            "results": results,
        });
        Self::new(MessageKind::BusinessEvent, event, Some(data))
    }

    pub fn clear_all() -> Self {
        Self::new(MessageKind::ClearAll, super::pattern::MATCH_ALL, None)
    }

    pub fn new(kind: MessageKind, pattern: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            data,
            timestamp: now_millis(),
        }
    }
}

/// Counts produced by a successful pattern invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationResult {
    pub pattern: String,
    pub memory_cleared: usize,
    pub storage_cleared: usize,
    pub timestamp: i64,
}

/// Per-pattern entry in a business-event result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PatternOutcome {
    Cleared(InvalidationResult),
    Failed { pattern: String, error: String },
}

impl PatternOutcome {
    pub fn pattern(&self) -> &str {
        match self {
            Self::Cleared(result) => &result.pattern,
            Self::Failed { pattern, .. } => pattern,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Read-only snapshot of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_cache_size: usize,
    pub subscriber_count: usize,
    pub storage_keys: usize,
    pub business_events: Vec<&'static str>,
    /// Present only when the worker cache answered in time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerStats>,
}
