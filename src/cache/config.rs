//! Cache configuration.

use std::time::Duration;

/// Runtime knobs shared by the registry and its hooks.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied by callers that do not pick their own.
    pub default_ttl: Duration,

    /// How long a stats request waits for the worker cache to reply.
    /// After this duration, stats are reported without the worker section.
    pub worker_stats_timeout: Duration,

    /// Destination handed to the navigation callback after logout.
    pub login_route: String,

    /// Persisted keys that make up the local session (auth token, profile...).
    /// Removed on logout before the full clear.
    pub session_keys: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(300_000), // 5 minutes
            worker_stats_timeout: Duration::from_secs(1),
            login_route: "/login".to_string(),
            session_keys: vec![
                "auth_token".to_string(),
                "user_data".to_string(),
                "session_id".to_string(),
            ],
        }
    }
}

impl CacheConfig {
    /// Create a config with the given default TTL.
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ..Default::default()
        }
    }

    /// Set the worker stats timeout (builder pattern).
    #[must_use]
    pub fn worker_stats_timeout(mut self, timeout: Duration) -> Self {
        self.worker_stats_timeout = timeout;
        self
    }

    /// Set the login route used after logout.
    #[must_use]
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Replace the list of session keys removed on logout.
    #[must_use]
    pub fn session_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}
