//! Background worker owning a Moka cache.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use super::{WorkerCacheAdapter, WorkerMessage, WorkerStats};
use crate::cache::{MATCH_ALL, matches_pattern};
use crate::error::WorkerError;

/// Broadcast capacity for worker invalidation events.
const EVENT_CAPACITY: usize = 100;

/// Emitted by the worker after it drops entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub pattern: String,
    pub removed: u64,
}

enum Command {
    Post {
        message: WorkerMessage,
        reply: Option<oneshot::Sender<WorkerStats>>,
    },
    Get {
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Handle to a worker task. Cloning is cheap and shares the same worker.
///
/// The cache itself lives inside the task; the handle only sends messages.
/// The task stops once every handle is dropped.
#[derive(Clone)]
pub struct WorkerCache {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerCache {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(max_capacity: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let cache = Cache::builder().max_capacity(max_capacity).build();
        tokio::spawn(run(rx, events.clone(), cache));
        info!("Worker cache started (capacity {})", max_capacity);

        Self { tx, events }
    }

    /// Populate the worker cache with a `PUT_ENTRY` message.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), WorkerError> {
        self.tx
            .send(Command::Post {
                message: WorkerMessage::put_entry(key, value),
                reply: None,
            })
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Read a value back from the worker cache.
    pub async fn get(&self, key: impl Into<String>) -> Result<Option<String>, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Get {
                key: key.into(),
                reply,
            })
            .map_err(|_| WorkerError::ChannelClosed)?;
        rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    /// Receive an event each time the worker drops entries.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for WorkerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCache")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[async_trait]
impl WorkerCacheAdapter for WorkerCache {
    async fn post(&self, message: WorkerMessage) -> Result<(), WorkerError> {
        self.tx
            .send(Command::Post {
                message,
                reply: None,
            })
            .map_err(|_| WorkerError::ChannelClosed)
    }

    async fn request_stats(&self, timeout: Duration) -> Result<WorkerStats, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Post {
                message: WorkerMessage::get_stats(),
                reply: Some(reply),
            })
            .map_err(|_| WorkerError::ChannelClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(_)) => Err(WorkerError::ChannelClosed),
            Err(_) => Err(WorkerError::Timeout(timeout)),
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<WorkerEvent>,
    cache: Cache<String, String>,
) {
    let mut invalidations = 0u64;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Get { key, reply } => {
                let _ = reply.send(cache.get(&key));
            }
            Command::Post { message, reply } => match message {
                WorkerMessage::PutEntry { key, value, .. } => cache.insert(key, value),
                WorkerMessage::InvalidatePattern { pattern, .. } => {
                    let doomed: Vec<String> = cache
                        .iter()
                        .filter(|(key, _)| matches_pattern(key.as_str(), &pattern))
                        .map(|(key, _)| String::clone(&key))
                        .collect();
                    for key in &doomed {
                        cache.invalidate(key);
                    }
                    invalidations += 1;
                    debug!("Worker dropped {} entries for '{}'", doomed.len(), pattern);

                    // No receivers is fine.
                    let _ = events.send(WorkerEvent {
                        pattern,
                        removed: doomed.len() as u64,
                    });
                }
                WorkerMessage::ClearAllCaches { .. } => {
                    cache.run_pending_tasks();
                    let removed = cache.entry_count();
                    cache.invalidate_all();
                    invalidations += 1;
                    debug!("Worker cleared all entries");

                    let _ = events.send(WorkerEvent {
                        pattern: MATCH_ALL.to_string(),
                        removed,
                    });
                }
                WorkerMessage::GetCacheStats { .. } => {
                    cache.run_pending_tasks();
                    if let Some(reply) = reply {
                        let _ = reply.send(WorkerStats {
                            entries: cache.entry_count(),
                            invalidations,
                        });
                    }
                }
            },
        }
    }

    debug!("Worker cache stopped");
}
