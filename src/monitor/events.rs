//! Event and identifier types for the zone event bus.
//!
//! Events are serializable so hosts can forward them (logs, sync queues)
//! without defining their own mirror types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::containment::Containment;
use crate::geo::LatLng;
use crate::location::PositionSample;
use crate::zone::{Zone, ZoneId};

/// Unique identifier for a bus subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a monitoring session.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event kinds subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Every accepted position sample.
    Location,
    /// Any committed containment transition.
    StateChanged,
    /// A zone was entered.
    Entered,
    /// A zone was exited.
    Exited,
    /// The primary zone changed.
    PrimaryChanged,
}

impl EventKind {
    /// All kinds, in per-sample delivery order.
    pub const ALL: [Self; 5] = [
        Self::Location,
        Self::StateChanged,
        Self::Entered,
        Self::Exited,
        Self::PrimaryChanged,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Location => "location",
            Self::StateChanged => "state_changed",
            Self::Entered => "entered",
            Self::Exited => "exited",
            Self::PrimaryChanged => "primary_changed",
        };
        f.write_str(name)
    }
}

/// Event payloads.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Published first for every sample the session accepts.
    Location {
        sample: PositionSample,
        /// Primary zone before this sample is evaluated.
        primary: Option<ZoneId>,
    },

    StateChanged {
        zone: Arc<Zone>,
        previous: Containment,
        current: Containment,
        position: LatLng,
    },

    Entered {
        zone: Arc<Zone>,
        position: LatLng,
    },

    Exited {
        zone: Arc<Zone>,
        position: LatLng,
    },

    PrimaryChanged {
        previous: Option<ZoneId>,
        current: Option<ZoneId>,
    },
}

impl EventPayload {
    /// The kind subscribers register for.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Location { .. } => EventKind::Location,
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::Entered { .. } => EventKind::Entered,
            Self::Exited { .. } => EventKind::Exited,
            Self::PrimaryChanged { .. } => EventKind::PrimaryChanged,
        }
    }

    /// The zone the event is about, for zone events.
    #[must_use]
    pub fn zone(&self) -> Option<&Zone> {
        match self {
            Self::StateChanged { zone, .. } | Self::Entered { zone, .. } | Self::Exited { zone, .. } => {
                Some(zone)
            }
            Self::Location { .. } | Self::PrimaryChanged { .. } => None,
        }
    }
}

/// A published event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub event_id: Uuid,
    pub session_id: SessionId,
    /// Monotonic per session; strictly increasing in delivery order.
    pub sequence: u64,
    /// Timestamp of the sample that produced the event.
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl ZoneEvent {
    /// Creates an event with a fresh id.
    #[must_use]
    pub fn new(session_id: SessionId, sequence: u64, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id,
            sequence,
            timestamp,
            payload,
        }
    }

    /// Shorthand for `self.payload.kind()`.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches_variant() {
        let zone = Arc::new(Zone::point("z", "Z", LatLng::new(0.0, 0.0)));
        let entered = EventPayload::Entered {
            zone: Arc::clone(&zone),
            position: LatLng::new(0.0, 0.0),
        };
        assert_eq!(entered.kind(), EventKind::Entered);
        assert_eq!(entered.zone().map(|z| z.id.as_str()), Some("z"));

        let primary = EventPayload::PrimaryChanged {
            previous: None,
            current: Some(ZoneId::from("z")),
        };
        assert_eq!(primary.kind(), EventKind::PrimaryChanged);
        assert!(primary.zone().is_none());
    }

    #[test]
    fn event_serializes_with_tagged_payload() {
        let ev = ZoneEvent::new(
            SessionId::new(),
            7,
            Utc::now(),
            EventPayload::PrimaryChanged {
                previous: Some(ZoneId::from("a")),
                current: None,
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["payload"]["type"], "primary_changed");
        assert_eq!(json["payload"]["previous"], "a");
        assert_eq!(json["sequence"], 7);

        let back: ZoneEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
