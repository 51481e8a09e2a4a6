//! Typed pub/sub event bus with tag-scoped subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::event::{BrokerEvent, EventType, ALL_EVENT_TYPES};

/// Event handler invoked synchronously on the poster's thread.
///
/// Handlers must not block; suspending work has to be handed off to a
/// background task by the subscriber.
pub type EventHandler = Arc<dyn Fn(&BrokerEvent) + Send + Sync>;

struct Subscriber {
    tag: String,
    handler: EventHandler,
}

/// Typed pub/sub bus delivering [`BrokerEvent`]s.
///
/// Subscribers register per event type under an opaque `tag` naming the
/// owning component, so the owner can revoke all of its subscriptions at
/// shutdown with [`EventBus::remove_subscribers_by_tag`]. For a single
/// emitter, handlers observe events in post order; across emitters the
/// order is unspecified.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<Subscriber>>>,
    in_flight: Mutex<usize>,
    quiesced: Condvar,
    released: AtomicBool,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(0),
            quiesced: Condvar::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Registers `handler` for every type in `types` under `tag`.
    ///
    /// A handler registered for several types is invoked once per matching
    /// post. Registrations on a released bus are ignored.
    pub fn subscribe(&self, types: &[EventType], tag: impl Into<String>, handler: EventHandler) {
        if self.released.load(Ordering::Acquire) {
            warn!("subscribe on released event bus ignored");
            return;
        }
        let tag = tag.into();
        let mut subs = self.subscribers.write();
        for event_type in types {
            subs.entry(*event_type).or_default().push(Subscriber {
                tag: tag.clone(),
                handler: Arc::clone(&handler),
            });
        }
    }

    /// Registers `handler` for every event type under `tag`.
    pub fn subscribe_all(&self, tag: impl Into<String>, handler: EventHandler) {
        self.subscribe(&ALL_EVENT_TYPES, tag, handler);
    }

    /// Removes every subscription registered under `tag`.
    pub fn remove_subscribers_by_tag(&self, tag: &str) {
        let mut subs = self.subscribers.write();
        for list in subs.values_mut() {
            list.retain(|s| s.tag != tag);
        }
        subs.retain(|_, list| !list.is_empty());
    }

    /// Delivers `event` to every subscriber of its type, in subscription
    /// order, on the calling thread. Posts on a released bus are dropped.
    pub fn post(&self, event: BrokerEvent) {
        if self.released.load(Ordering::Acquire) {
            debug!(event_type = %event.event_type(), "event dropped: bus released");
            return;
        }
        {
            let mut in_flight = self.in_flight.lock();
            *in_flight += 1;
        }
        // Handlers run without the subscriber lock held so they may
        // subscribe or unsubscribe reentrantly.
        let handlers: Vec<EventHandler> = {
            let subs = self.subscribers.read();
            subs.get(&event.event_type())
                .map(|list| list.iter().map(|s| Arc::clone(&s.handler)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(&event);
        }
        let mut in_flight = self.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.quiesced.notify_all();
        }
    }

    /// Marks the bus released, waits for in-flight deliveries to quiesce and
    /// drops all subscriptions. Subsequent posts are dropped.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.quiesced.wait(&mut in_flight);
        }
        drop(in_flight);
        self.subscribers.write().clear();
    }

    /// Returns the number of subscriptions currently registered.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
