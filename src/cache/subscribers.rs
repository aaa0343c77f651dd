//! Subscriber list with handle-based registration.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error};

use super::message::InvalidationMessage;

/// Callback invoked for every invalidation message.
pub type Subscriber = Arc<dyn Fn(&InvalidationMessage) + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Subscriber)>>,
}

/// Registered callbacks, in insertion order.
///
/// Each `subscribe` call is its own registration: the same closure
/// registered twice stays active until both handles are released.
#[derive(Clone, Default)]
pub struct SubscriberList {
    slots: Arc<Slots>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback and return the handle that owns the registration.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InvalidationMessage) + Send + Sync + 'static,
    {
        let id = self.slots.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Subscriber = Arc::new(callback);
        self.slots.entries.write().push((id, callback));
        debug!("Subscriber {} registered", id);

        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
            active: true,
        }
    }

    /// Deliver `message` to every subscriber.
    ///
    /// A panicking subscriber is logged and skipped; the rest still run.
    /// Returns how many subscribers completed normally.
    pub fn notify(&self, message: &InvalidationMessage) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe while running.
        let snapshot: Vec<(u64, Subscriber)> = self.slots.entries.read().clone();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(
                    "Subscriber {} panicked while handling {:?} for '{}'",
                    id, message.kind, message.pattern
                ),
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.slots.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.entries.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("count", &self.len())
            .finish()
    }
}

/// Owns one registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    slots: Weak<Slots>,
    active: bool,
}

impl Subscription {
    /// Remove this registration. Calling it on a released handle is a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(slots) = self.slots.upgrade() {
            slots.entries.write().retain(|(id, _)| *id != self.id);
            debug!("Subscriber {} removed", self.id);
        }
    }

    /// Keep the registration alive for the lifetime of the registry.
    pub fn detach(mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
