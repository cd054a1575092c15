//! Rolling log of enter/exit transitions.
//!
//! Hosts use it to show recent history or to forward transitions to a sync
//! queue. The log is bounded; the oldest records are evicted first.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::LatLng;
use crate::monitor::{EventBus, EventKind, EventPayload, SubscriptionId, ZoneEvent};
use crate::zone::ZoneId;

/// Direction of a logged transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The zone was entered.
    Enter,
    /// The zone was exited.
    Exit,
}

/// One logged transition.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    pub position: LatLng,
}

impl TransitionRecord {
    /// Builds a record from an `Entered` or `Exited` event.
    #[must_use]
    pub fn from_event(event: &ZoneEvent) -> Option<Self> {
        let (zone, position, kind) = match &event.payload {
            EventPayload::Entered { zone, position } => (zone, *position, TransitionKind::Enter),
            EventPayload::Exited { zone, position } => (zone, *position, TransitionKind::Exit),
            _ => return None,
        };
        Some(Self {
            id: event.event_id,
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            kind,
            at: event.timestamp,
            position,
        })
    }
}

type Records = Mutex<VecDeque<TransitionRecord>>;

fn push_bounded(records: &Records, capacity: usize, record: TransitionRecord) {
    let mut records = records.lock().unwrap_or_else(PoisonError::into_inner);
    while records.len() >= capacity {
        records.pop_front();
    }
    records.push_back(record);
}

/// Bounded transition log fed by an [`EventBus`].
pub struct TransitionLog {
    records: Arc<Records>,
    capacity: usize,
    bus: Weak<EventBus>,
    subscriptions: [(EventKind, SubscriptionId); 2],
}

impl fmt::Debug for TransitionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl TransitionLog {
    /// Subscribes to `Entered` and `Exited` on `bus`, keeping at most
    /// `capacity` records (at least one).
    #[must_use]
    pub fn attach(bus: &Arc<EventBus>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let records: Arc<Records> = Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(256))));

        let subscriptions = [EventKind::Entered, EventKind::Exited].map(|kind| {
            let records = Arc::clone(&records);
            let id = bus.on(kind, move |event| {
                if let Some(record) = TransitionRecord::from_event(event) {
                    push_bounded(&records, capacity, record);
                }
            });
            (kind, id)
        });

        Self {
            records,
            capacity,
            bus: Arc::downgrade(bus),
            subscriptions,
        }
    }

    /// Maximum number of records kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records in chronological order.
    #[must_use]
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns all records, oldest first.
    pub fn drain(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Discards all records.
    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Drop for TransitionLog {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            for (kind, id) in self.subscriptions {
                bus.off(kind, id);
            }
        }
    }
}
