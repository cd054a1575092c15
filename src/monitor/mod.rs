//! Event delivery for zone monitoring.
//!
//! Delivery is in-process and synchronous: the monitoring session publishes
//! through an [`EventBus`] on the thread that produced the position sample.
//! Hosts that want to consume events elsewhere open an [`EventStream`].

/// Publish/subscribe bus with handler isolation.
pub mod bus;
/// Event and identifier types.
pub mod events;
/// Channel-backed subscriber handle.
pub mod stream;

pub use bus::{EventBus, EventHandler, DEFAULT_STREAM_CAPACITY};
pub use events::{EventKind, EventPayload, SessionId, SubscriptionId, ZoneEvent};
pub use stream::EventStream;
