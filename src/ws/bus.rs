//! Typed publish/subscribe dispatch
//!
//! Event tag -> ordered handler list. Handlers are `Arc` closures so the
//! same handler can be registered, compared and removed by identity.
//! Subscribing returns a [`Subscription`] capability that removes the
//! handler again without needing the original reference.
//!
//! Publishing snapshots the handler list and invokes it outside the lock, so
//! handlers may subscribe or unsubscribe while being called. The live set is
//! read at delivery time.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Handler callback
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: u64,
    handler: Handler<E>,
}

struct BusInner<E> {
    topics: Mutex<HashMap<String, Vec<Entry<E>>>>,
    next_id: AtomicU64,
}

/// Removal side of a bus, erased over the event type
trait Unsubscribe: Send + Sync {
    fn remove(&self, event: &str, id: u64) -> bool;
}

impl<E> Unsubscribe for BusInner<E> {
    fn remove(&self, event: &str, id: u64) -> bool {
        let mut topics = self.topics.lock();
        let Some(entries) = topics.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            topics.remove(event);
        }
        removed
    }
}

/// Event bus; clones share the same handler table
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for `event`
    ///
    /// Registering the same `Arc` twice for one event is a no-op that returns
    /// a capability for the existing registration.
    pub fn on(&self, event: &str, handler: Handler<E>) -> Subscription {
        let mut topics = self.inner.topics.lock();
        let entries = topics.entry(event.to_string()).or_default();

        let id = match entries.iter().find(|e| Arc::ptr_eq(&e.handler, &handler)) {
            Some(existing) => existing.id,
            None => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                entries.push(Entry { id, handler });
                id
            }
        };

        let inner: Arc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            event: event.to_string(),
            id,
            bus: Arc::downgrade(&inner),
        }
    }

    /// Register a closure for `event`
    pub fn subscribe<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on(event, Arc::new(f))
    }

    /// Remove `handler` from `event` by identity
    pub fn off(&self, event: &str, handler: &Handler<E>) -> bool {
        let id = {
            let topics = self.inner.topics.lock();
            topics
                .get(event)
                .and_then(|entries| entries.iter().find(|e| Arc::ptr_eq(&e.handler, handler)))
                .map(|e| e.id)
        };
        match id {
            Some(id) => self.inner.remove(event, id),
            None => false,
        }
    }

    /// Invoke every handler registered for `event`; returns how many ran
    pub fn publish(&self, event: &str, payload: &E) -> usize {
        let handlers: Vec<Handler<E>> = {
            let topics = self.inner.topics.lock();
            match topics.get(event) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
                None => return 0,
            }
        };
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.topics.lock().get(event).map_or(0, Vec::len)
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to remove one registration
///
/// Dropping it leaves the handler registered.
#[derive(Clone)]
pub struct Subscription {
    event: String,
    id: u64,
    bus: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the handler; false if it was already gone
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(&self.event, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
