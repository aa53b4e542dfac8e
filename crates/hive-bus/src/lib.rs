//! # hive-bus
//!
//! In-process pub/sub keyed by `(client, source-topic)`.
//!
//! Unlike a broadcast channel, [`EventBus::emit`] completes only after every
//! matching subscriber has been invoked, serially, in subscription order —
//! the ordering guarantee the runtime's observability contract requires.
//! Subscribing under the wildcard client `"*"` receives events of every
//! client on that topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

use hive_core::{ClientId, EventSource, SwarmEvent};

/// Type-erased async event handler.
pub type EventHandler = Arc<dyn Fn(SwarmEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Predicate gating a [`EventBus::once`] subscription.
pub type EventFilter = Arc<dyn Fn(&SwarmEvent) -> bool + Send + Sync>;

struct Entry {
    id: u64,
    handler: EventHandler,
    filter: Option<EventFilter>,
    once: bool,
}

type SubscriberMap = HashMap<(ClientId, EventSource), Vec<Entry>>;

struct BusInner {
    subscribers: Mutex<SubscriberMap>,
    next_id: AtomicU64,
}

/// The bus. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Handle to one subscription. Detached — dropping it does *not*
/// unsubscribe; call [`Subscription::unsubscribe`] or dispose the client.
pub struct Subscription {
    bus: Weak<BusInner>,
    key: (ClientId, EventSource),
    id: u64,
}

impl Subscription {
    /// Remove the subscription from the bus.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut map = inner.subscribers.lock();
            if let Some(entries) = map.get_mut(&self.key) {
                entries.retain(|e| e.id != self.id);
                if entries.is_empty() {
                    let _ = map.remove(&self.key);
                }
            }
        }
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    fn insert(
        &self,
        client_id: ClientId,
        source: EventSource,
        handler: EventHandler,
        filter: Option<EventFilter>,
        once: bool,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let key = (client_id, source);
        self.inner
            .subscribers
            .lock()
            .entry(key.clone())
            .or_default()
            .push(Entry {
                id,
                handler,
                filter,
                once,
            });
        Subscription {
            bus: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Subscribe to every event of `(client_id, source)`. The wildcard
    /// client [`ClientId::wildcard`] matches all clients.
    pub fn subscribe(
        &self,
        client_id: ClientId,
        source: EventSource,
        handler: EventHandler,
    ) -> Subscription {
        self.insert(client_id, source, handler, None, false)
    }

    /// Subscribe for exactly one event matching `filter`, then
    /// auto-unsubscribe.
    pub fn once(
        &self,
        client_id: ClientId,
        source: EventSource,
        filter: EventFilter,
        handler: EventHandler,
    ) -> Subscription {
        self.insert(client_id, source, handler, Some(filter), true)
    }

    /// Deliver `event` to every matching subscriber — exact client first
    /// interleaved with wildcard, in subscription order — and return once
    /// all handlers completed.
    pub async fn emit(&self, client_id: &ClientId, event: SwarmEvent) {
        let handlers = {
            let mut map = self.inner.subscribers.lock();
            let mut selected: Vec<(u64, EventHandler)> = Vec::new();

            let mut collect = |map: &mut SubscriberMap, key: &(ClientId, EventSource)| {
                if let Some(entries) = map.get_mut(key) {
                    entries.retain(|entry| {
                        let matches = entry
                            .filter
                            .as_ref()
                            .map_or(true, |filter| filter(&event));
                        if matches {
                            selected.push((entry.id, entry.handler.clone()));
                        }
                        !(entry.once && matches)
                    });
                    if entries.is_empty() {
                        let _ = map.remove(key);
                    }
                }
            };

            collect(&mut map, &(client_id.clone(), event.source));
            if !client_id.is_wildcard() {
                collect(&mut map, &(ClientId::wildcard(), event.source));
            }

            // Subscription order across exact and wildcard keys.
            selected.sort_by_key(|(id, _)| *id);
            selected
        };

        debug!(
            client_id = %client_id,
            source = ?event.source,
            event_type = %event.event_type,
            subscribers = handlers.len(),
            "bus emit"
        );

        for (_, handler) in handlers {
            handler(event.clone()).await;
        }
    }

    /// Remove every subscription of `client_id` across all sources.
    pub fn dispose(&self, client_id: &ClientId) {
        let mut map = self.inner.subscribers.lock();
        map.retain(|(subscriber, _), _| subscriber != client_id);
        debug!(client_id = %client_id, "bus subscriptions disposed");
    }

    /// Number of subscriptions for `(client_id, source)`.
    #[must_use]
    pub fn subscriber_count(&self, client_id: &ClientId, source: EventSource) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(&(client_id.clone(), source))
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
