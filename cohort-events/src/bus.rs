//! Publish/subscribe bus decoupling mutation producers from consumers.
//!
//! Handlers run synchronously on the publisher's stack, in subscription
//! order, against a snapshot of the registrations taken when `publish` is
//! called. A handler registered after `publish` returns never sees that
//! event: nothing is buffered or replayed.
//!
//! Async consumers that prefer a stream can take a
//! [`broadcast::Receiver`] via [`InvalidationBus::subscribe_all`]; slow
//! receivers lag and drop events rather than blocking publishers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::event::InvalidationEvent;

/// Channel capacity for [`InvalidationBus::subscribe_all`] receivers.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

type Handler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<InvalidationEvent, Vec<(u64, Handler)>>,
}

struct BusInner {
    registry: Mutex<Registry>,
    tx: broadcast::Sender<InvalidationEvent>,
}

impl BusInner {
    // Handlers never run while the lock is held, so the registry is always
    // consistent even if a handler panicked.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, event: InvalidationEvent, id: u64) -> bool {
        let mut registry = self.registry();
        let Some(list) = registry.handlers.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.handlers.remove(&event);
        }
        removed
    }
}

/// Process-wide invalidation bus.
///
/// Construct once per session and clone the handle into every producer and
/// consumer; clones share the same registrations.
#[derive(Clone)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::with_stream_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Create a bus whose stream receivers buffer up to `capacity` events.
    pub fn with_stream_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                tx,
            }),
        }
    }

    /// Announce `event` to every handler currently subscribed to it.
    ///
    /// Returns the number of handlers invoked. Never awaits.
    pub fn publish(&self, event: InvalidationEvent) -> usize {
        let snapshot: Vec<Handler> = {
            let registry = self.inner.registry();
            registry
                .handlers
                .get(&event)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in &snapshot {
            handler();
        }

        // No stream receivers is not an error.
        let streams = self.inner.tx.send(event).unwrap_or(0);
        debug!(
            event = event.as_str(),
            handlers = snapshot.len(),
            streams,
            "Published invalidation event"
        );
        snapshot.len()
    }

    /// Register `handler` for `event`.
    ///
    /// The registration lives as long as the returned [`Subscription`].
    /// Handlers should be idempotent and cheap; spawn a task for real work.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, event: InvalidationEvent, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.inner.registry();
            registry.next_id += 1;
            let id = registry.next_id;
            registry
                .handlers
                .entry(event)
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };
        trace!(event = event.as_str(), id, "Subscribed handler");
        Subscription {
            bus: Arc::downgrade(&self.inner),
            event,
            id,
            active: true,
        }
    }

    /// Register one handler for several events.
    #[must_use = "dropping the Subscriptions unsubscribes immediately"]
    pub fn subscribe_many<F>(&self, events: &[InvalidationEvent], handler: F) -> Vec<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        events
            .iter()
            .map(|event| {
                let handler = Arc::clone(&handler);
                self.subscribe(*event, move || handler())
            })
            .collect()
    }

    /// Receive every event published from now on as a stream.
    pub fn subscribe_all(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.inner.tx.subscribe()
    }

    /// Number of callback handlers registered for `event`.
    pub fn subscriber_count(&self, event: InvalidationEvent) -> usize {
        self.inner
            .registry()
            .handlers
            .get(&event)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry();
        let counts: HashMap<&'static str, usize> = registry
            .handlers
            .iter()
            .map(|(event, list)| (event.as_str(), list.len()))
            .collect();
        f.debug_struct("InvalidationBus")
            .field("handlers", &counts)
            .finish()
    }
}

/// Handle for a registered handler. Dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<BusInner>,
    event: InvalidationEvent,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn event(&self) -> InvalidationEvent {
        self.event
    }

    /// Remove the registration now. Returns whether it was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.bus.upgrade() {
            Some(bus) => {
                let removed = bus.remove(self.event, self.id);
                trace!(event = self.event.as_str(), id = self.id, "Unsubscribed handler");
                removed
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
