//! arca-cache - cache invalidation service entry point.
//!
//! Wires storage, the worker cache and the registry from the environment,
//! then replays the business events given on the command line:
//!
//! ```text
//! arca-cache contributor_updated '{"cuit":"20999888777"}' daily_sync
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arca_cache::config::Config;
use arca_cache::{
    CacheRegistry, InvalidationHook, JsonFileStorage, MemoryStorage, StorageAdapter, WorkerCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arca_cache=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting arca-cache...");

    let config = Config::from_env();
    info!("Configuration loaded successfully");

    let storage: Arc<dyn StorageAdapter> = match &config.storage_path {
        Some(path) => Arc::new(
            JsonFileStorage::open(path)
                .with_context(|| format!("opening storage at {}", path.display()))?,
        ),
        None => {
            info!("No CACHE_STORAGE_PATH set, using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let mut registry = CacheRegistry::new(storage)
        .with_session_storage(Arc::new(MemoryStorage::new()))
        .with_config(config.cache_config());

    let worker = config.worker_enabled.then(|| WorkerCache::spawn(config.worker_capacity));
    if let Some(worker) = &worker {
        registry = registry.with_worker(Arc::new(worker.clone()));
    }
    let registry = Arc::new(registry);

    let _relay = worker
        .as_ref()
        .map(|worker| registry.relay_worker_events(worker.subscribe()));

    let hook = InvalidationHook::bind(Arc::clone(&registry));
    hook.on_cache_invalidated("*", |message| {
        info!("{:?} -> {}", message.kind, message.pattern);
    })?;

    for (name, data) in parse_events(std::env::args().skip(1))? {
        let results = hook.invalidate_on_event_name(&name, data).await?;
        let failed = results.iter().filter(|r| r.is_failed()).count();
        if failed > 0 {
            warn!("{}: {} of {} patterns failed", name, failed, results.len());
        } else {
            info!("{}: {} patterns invalidated", name, results.len());
        }
    }

    let stats = registry.stats_with_worker().await;
    info!("Cache stats: {}", serde_json::to_string(&stats)?);

    Ok(())
}

/// Pair each event name with the JSON payload that follows it, if any.
fn parse_events(args: impl Iterator<Item = String>) -> anyhow::Result<Vec<(String, Value)>> {
    let mut events: Vec<(String, Value)> = Vec::new();

    for arg in args {
        if arg.trim_start().starts_with('{') {
            let data: Value =
                serde_json::from_str(&arg).with_context(|| format!("invalid payload: {arg}"))?;
            match events.last_mut() {
                Some((_, slot)) => *slot = data,
                None => anyhow::bail!("payload given before any event name: {arg}"),
            }
        } else {
            events.push((arg, Value::Object(Default::default())));
        }
    }

    Ok(events)
}
