//! Synchronous event bus.
//!
//! Handlers run on the publishing thread, in publish order. Each handler call
//! is isolated: a panicking handler is logged and counted, and the remaining
//! handlers still receive the event. Handler lists are snapshotted before
//! delivery, so handlers may subscribe or unsubscribe while being called.
//! Channel-backed [`EventStream`]s never block the publisher; events that do
//! not fit into a stream buffer are dropped and counted.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{bounded, Sender, TrySendError};

use super::events::{EventKind, SubscriptionId, ZoneEvent};
use super::stream::EventStream;

/// Default per-stream buffer capacity.
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

/// Callback registered with [`EventBus::on`].
pub type EventHandler = Arc<dyn Fn(&ZoneEvent) + Send + Sync>;

#[derive(Debug)]
pub(crate) struct StreamEntry {
    kinds: HashSet<EventKind>,
    tx: Sender<ZoneEvent>,
}

pub(crate) type StreamRegistry = RwLock<HashMap<SubscriptionId, StreamEntry>>;

/// In-process publish/subscribe channel for zone events.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, HashMap<SubscriptionId, EventHandler>>>,
    streams: Arc<StreamRegistry>,
    handler_faults: AtomicU64,
    dropped_events: AtomicU64,
    published: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("streams", &self.stream_count())
            .field("handler_faults", &self.handler_faults())
            .field("dropped_events", &self.dropped_events())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            streams: Arc::new(RwLock::new(HashMap::new())),
            handler_faults: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ZoneEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .insert(id, Arc::new(handler));
        id
    }

    /// Removes a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(by_id) = handlers.get_mut(&kind) else {
            return false;
        };
        let removed = by_id.remove(&id).is_some();
        if by_id.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    /// Opens a channel-backed subscription for the given kinds.
    ///
    /// An empty `kinds` slice subscribes to every kind.
    #[must_use]
    pub fn stream(&self, kinds: &[EventKind], capacity: usize) -> EventStream {
        let kinds: HashSet<EventKind> = if kinds.is_empty() {
            EventKind::ALL.into_iter().collect()
        } else {
            kinds.iter().copied().collect()
        };
        let (tx, rx) = bounded::<ZoneEvent>(capacity.max(1));
        let id = SubscriptionId::new();
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, StreamEntry { kinds, tx });
        EventStream::new(id, rx, Arc::downgrade(&self.streams))
    }

    /// Delivers one event to every handler and stream registered for its kind.
    pub fn publish(&self, event: &ZoneEvent) {
        let kind = event.kind();
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<(SubscriptionId, EventHandler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|by_id| by_id.iter().map(|(id, h)| (*id, Arc::clone(h))).collect())
            .unwrap_or_default();

        for (id, handler) in targets {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                self.handler_faults.fetch_add(1, Ordering::Relaxed);
                log::warn!("event handler {id} panicked while handling {kind} event #{}", event.sequence);
            }
        }

        self.deliver_to_streams(kind, event);
    }

    /// Publishes events in slice order.
    pub fn publish_all(&self, events: &[ZoneEvent]) {
        for event in events {
            self.publish(event);
        }
    }

    fn deliver_to_streams(&self, kind: EventKind, event: &ZoneEvent) {
        let mut disconnected = Vec::new();
        {
            let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
            for (id, entry) in streams.iter().filter(|(_, e)| e.kinds.contains(&kind)) {
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped_events.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
        }

        if !disconnected.is_empty() {
            let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
            for id in disconnected {
                streams.remove(&id);
            }
        }
    }

    /// Number of registered handlers across all kinds.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Number of open streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handler calls that panicked.
    #[must_use]
    pub fn handler_faults(&self) -> u64 {
        self.handler_faults.load(Ordering::Relaxed)
    }

    /// Events dropped because a stream buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Events published since creation.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::monitor::events::{EventPayload, SessionId};
    use crate::zone::ZoneId;

    fn primary_event(seq: u64) -> ZoneEvent {
        ZoneEvent::new(
            SessionId::new(),
            seq,
            Utc::now(),
            EventPayload::PrimaryChanged {
                previous: None,
                current: Some(ZoneId::from("z")),
            },
        )
    }

    #[test]
    fn handlers_receive_only_their_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        bus.on(EventKind::PrimaryChanged, move |ev| seen2.lock().unwrap().push(ev.sequence));
        bus.on(EventKind::Entered, |_| panic!("wrong kind delivered"));

        bus.publish(&primary_event(1));
        bus.publish(&primary_event(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(bus.handler_faults(), 0);
    }

    #[test]
    fn off_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = bus.on(EventKind::PrimaryChanged, move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.publish(&primary_event(1));
        assert!(bus.off(EventKind::PrimaryChanged, id));
        assert!(!bus.off(EventKind::PrimaryChanged, id));
        bus.publish(&primary_event(2));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            bus.on(EventKind::PrimaryChanged, move |_| {
                c.fetch_add(1, Ordering::Relaxed);
            });
        }
        bus.on(EventKind::PrimaryChanged, |_| panic!("subscriber bug"));

        bus.publish(&primary_event(1));
        assert_eq!(count.load(Ordering::Relaxed), 3);
        assert_eq!(bus.handler_faults(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicU64::new(0));

        let bus2 = Arc::clone(&bus);
        let slot2 = Arc::clone(&slot);
        let c = Arc::clone(&count);
        let id = bus.on(EventKind::PrimaryChanged, move |_| {
            c.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = *slot2.lock().unwrap() {
                bus2.off(EventKind::PrimaryChanged, id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.publish(&primary_event(1));
        bus.publish(&primary_event(2));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn full_stream_drops_without_blocking() {
        let bus = EventBus::new();
        let stream = bus.stream(&[EventKind::PrimaryChanged], 2);
        for seq in 0..5 {
            bus.publish(&primary_event(seq));
        }
        assert_eq!(bus.dropped_events(), 3);
        assert_eq!(stream.drain().len(), 2);
    }

    #[test]
    fn dropped_stream_is_unregistered() {
        let bus = EventBus::new();
        let stream = bus.stream(&[], 4);
        assert_eq!(bus.stream_count(), 1);
        drop(stream);
        assert_eq!(bus.stream_count(), 0);
        bus.publish(&primary_event(1));
        assert_eq!(bus.dropped_events(), 0);
    }
}
