//! Configuration module for the cache service.
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL for memory entries, in milliseconds.
    pub default_ttl_ms: u64,

    /// Persistent storage file. In-memory storage is used when unset.
    pub storage_path: Option<PathBuf>,

    // Worker cache
    pub worker_enabled: bool,
    pub worker_capacity: u64,
    pub worker_stats_timeout_ms: u64,

    /// Where logout sends the user.
    pub login_route: String,

    /// Persisted keys removed on logout (comma-separated).
    pub session_keys: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            default_ttl_ms: cache.default_ttl.as_millis() as u64,
            storage_path: None,
            worker_enabled: true,
            worker_capacity: 10_000,
            worker_stats_timeout_ms: cache.worker_stats_timeout.as_millis() as u64,
            login_route: cache.login_route,
            session_keys: cache.session_keys,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let number = |key: &str, fallback: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(fallback)
        };

        let worker_enabled = lookup("WORKER_CACHE_ENABLED")
            .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.worker_enabled);

        let storage_path = lookup("CACHE_STORAGE_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        // Parse session keys
        let session_keys = lookup("SESSION_KEYS")
            .map(|s| {
                s.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.session_keys);

        Self {
            default_ttl_ms: number("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            storage_path,
            worker_enabled,
            worker_capacity: number("WORKER_CACHE_CAPACITY", defaults.worker_capacity),
            worker_stats_timeout_ms: number(
                "WORKER_STATS_TIMEOUT_MS",
                defaults.worker_stats_timeout_ms,
            ),
            login_route: lookup("LOGIN_ROUTE").unwrap_or(defaults.login_route),
            session_keys,
        }
    }

    /// Registry settings derived from this config.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::with_ttl(Duration::from_millis(self.default_ttl_ms))
            .worker_stats_timeout(Duration::from_millis(self.worker_stats_timeout_ms))
            .login_route(self.login_route.clone())
            .session_keys(self.session_keys.clone())
    }
}
