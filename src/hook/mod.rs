//! Invalidation hook - per-scope façade over the registry.
//!
//! A hook is bound to one UI scope. Binding subscribes it to the registry;
//! unbinding (or dropping the hook) releases the subscription and every
//! local listener registered through it.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{
    CacheConfig, CacheRegistry, InvalidationMessage, InvalidationResult, MATCH_ALL,
    PatternOutcome, Subscription, matches_pattern,
};
use crate::error::CacheError;
use crate::events::BusinessEvent;
use crate::storage::StorageAdapter;

/// Identifies a listener registered with [`InvalidationHook::on_cache_invalidated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Lifecycle of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Bound,
    Unbound,
}

type Listener = Arc<dyn Fn(&InvalidationMessage) + Send + Sync>;

struct LocalListener {
    id: ListenerId,
    filter: String,
    callback: Listener,
}

impl LocalListener {
    fn wants(&self, message: &InvalidationMessage) -> bool {
        self.filter == MATCH_ALL
            || matches_pattern(&message.pattern, &self.filter)
            || message.pattern.contains(self.filter.as_str())
    }
}

/// Binds a [`CacheRegistry`] to one consumer scope.
pub struct InvalidationHook {
    registry: Option<Arc<CacheRegistry>>,
    subscription: Option<Subscription>,
    listeners: Arc<Mutex<Vec<LocalListener>>>,
    next_listener: AtomicU64,
    login_route: String,
}

impl InvalidationHook {
    /// Bind a new hook to `registry`.
    pub fn bind(registry: Arc<CacheRegistry>) -> Self {
        let listeners: Arc<Mutex<Vec<LocalListener>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatch = Arc::clone(&listeners);
        let subscription = registry.subscribe(move |message| dispatch_local(&dispatch, message));
        let login_route = registry.config().login_route.clone();
        debug!("Invalidation hook bound");

        Self {
            registry: Some(registry),
            subscription: Some(subscription),
            listeners,
            next_listener: AtomicU64::new(0),
            login_route,
        }
    }

    /// Release the registry subscription and every local listener.
    ///
    /// Calling this on an unbound hook is a no-op.
    pub fn unbind(&mut self) {
        if self.registry.take().is_none() {
            return;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.listeners.lock().clear();
        debug!("Invalidation hook unbound");
    }

    pub fn state(&self) -> HookState {
        if self.registry.is_some() {
            HookState::Bound
        } else {
            HookState::Unbound
        }
    }

    fn registry(&self) -> Result<&Arc<CacheRegistry>, CacheError> {
        self.registry.as_ref().ok_or(CacheError::Unbound)
    }

    /// Fire a business event through the registry.
    pub async fn invalidate_on_event(
        &self,
        event: &BusinessEvent,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        let registry = self.registry()?;
        Ok(registry.invalidate_by_business_event(event).await)
    }

    /// Fire a business event given by name and raw payload.
    pub async fn invalidate_on_event_name(
        &self,
        name: &str,
        data: Value,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.registry()?.invalidate_by_event_name(name, data).await
    }

    pub async fn invalidate_pattern(
        &self,
        pattern: &str,
    ) -> Result<InvalidationResult, CacheError> {
        self.registry()?.invalidate_pattern(pattern).await
    }

    /// Call `callback` for invalidations whose pattern matches or contains
    /// `filter`. A filter of `*` receives everything.
    pub fn on_cache_invalidated<F>(
        &self,
        filter: impl Into<String>,
        callback: F,
    ) -> Result<ListenerId, CacheError>
    where
        F: Fn(&InvalidationMessage) + Send + Sync + 'static,
    {
        self.registry()?;

        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(LocalListener {
            id,
            filter: filter.into(),
            callback: Arc::new(callback),
        });
        Ok(id)
    }

    /// Remove a local listener. Returns false if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// Invalidate `pattern`, then run `refresh`. Errors from either propagate.
    pub async fn refresh_after_invalidation<F, Fut, T, E>(
        &self,
        pattern: &str,
        refresh: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        self.invalidate_pattern(pattern).await?;
        refresh().await
    }

    /// Fire `user_logout`, drop the persisted session, then clear every layer.
    pub async fn logout_with_cache_cleanup(&self) -> Result<(), CacheError> {
        let registry = self.registry()?;

        registry
            .invalidate_by_business_event(&BusinessEvent::UserLogout)
            .await;

        remove_session_keys(registry.storage().as_ref(), registry.config());
        if let Some(session) = registry.session_storage() {
            remove_session_keys(session.as_ref(), registry.config());
        }

        registry.clear_all().await;
        info!("Logout cleanup complete");
        Ok(())
    }

    /// Run logout cleanup, then navigate to the login route.
    ///
    /// `navigate` is always called, even when cleanup fails or the hook is
    /// unbound. The cleanup result is returned afterwards.
    pub async fn logout_with_navigation<N>(&self, navigate: N) -> Result<(), CacheError>
    where
        N: FnOnce(&str),
    {
        let result = self.logout_with_cache_cleanup().await;
        if let Err(e) = &result {
            error!("Logout cleanup failed: {}", e);
        }
        navigate(self.login_route.as_str());
        result
    }

    // --- convenience wrappers ---

    pub async fn invalidate_contributor(
        &self,
        cuit: impl Into<String>,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::ContributorUpdated { cuit: cuit.into() })
            .await
    }

    pub async fn invalidate_compliance(
        &self,
        cuit: impl Into<String>,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::ComplianceCheckCompleted { cuit: cuit.into() })
            .await
    }

    pub async fn invalidate_invoice(
        &self,
        invoice_id: impl Into<String>,
        cuit: impl Into<String>,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::InvoiceProcessed {
            invoice_id: invoice_id.into(),
            cuit: cuit.into(),
        })
        .await
    }

    pub async fn mark_notifications_read(
        &self,
        user_id: impl Into<String>,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::NotificationRead {
            user_id: user_id.into(),
        })
        .await
    }

    pub async fn invalidate_settings(
        &self,
        user_id: impl Into<String>,
    ) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::SettingsUpdated {
            user_id: user_id.into(),
        })
        .await
    }

    pub async fn trigger_daily_sync(&self) -> Result<Vec<PatternOutcome>, CacheError> {
        self.invalidate_on_event(&BusinessEvent::DailySync).await
    }
}

impl Drop for InvalidationHook {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl std::fmt::Debug for InvalidationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationHook")
            .field("state", &self.state())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

fn dispatch_local(listeners: &Mutex<Vec<LocalListener>>, message: &InvalidationMessage) {
    // Snapshot so a listener may add or remove listeners while running.
    let matching: Vec<Listener> = listeners
        .lock()
        .iter()
        .filter(|listener| listener.wants(message))
        .map(|listener| Arc::clone(&listener.callback))
        .collect();

    for callback in matching {
        if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
            error!("Local cache listener panicked for '{}'", message.pattern);
        }
    }
}

fn remove_session_keys(storage: &dyn StorageAdapter, config: &CacheConfig) {
    for key in &config.session_keys {
        if let Err(e) = storage.remove(key) {
            warn!("Could not remove session key '{}': {}", key, e);
        }
    }
}
