//! # Zonewatch - Geofence Monitoring Engine
//!
//! Zonewatch watches a stream of position samples against a set of zones
//! (points, circles and polygons) and reports debounced transitions.
//!
//! ## Core Concepts
//!
//! - **Zone**: A named region with a shape, an optional risk label and a source tag
//! - **Containment**: The raw relation of a position to a zone (outside, approaching, inside)
//! - **Stability filter**: Commits a containment change only after consecutive agreeing samples
//! - **Primary zone**: The riskiest zone the position is inside, ties broken by proximity
//! - **Zone store**: Loads zones through a cache, remote, bundled fallback chain
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zonewatch::{EventKind, Geofencer, LatLng, ManualLocationSource, PositionSample, Zone};
//!
//! let geofencer = Geofencer::default();
//! geofencer.set_zones(vec![
//!     Zone::circle("depot", "Depot", LatLng::new(28.61, 77.21), 2.0).with_risk_label("High"),
//! ]);
//!
//! let entered = geofencer.stream(&[EventKind::Entered]);
//! let feed = ManualLocationSource::new();
//! let session = geofencer.start_monitoring(&feed, None);
//!
//! feed.push(PositionSample::now(28.61, 77.21));
//! feed.push(PositionSample::now(28.61, 77.21));
//! let event = entered.recv()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Geometry and zone model
pub mod containment;
pub mod error;
pub mod geo;
pub mod zone;

// Per-zone evaluation
pub mod resolver;
pub mod stability;

// Zone loading
pub mod config;
pub mod source;
pub mod storage;
pub mod store;

// Monitoring
pub mod geofencer;
pub mod location;
pub mod monitor;
pub mod session;
pub mod transitions;

pub use config::GeofenceConfig;
pub use containment::{classify, evaluate, Containment};
pub use error::{ExecutionError, GeometryFault, SourceError, ValidationError, ZoneError, ZoneResult};
pub use geo::{haversine_km, point_in_polygon, LatLng};
pub use geofencer::{Geofencer, GeofencerBuilder};
pub use location::{LocationSource, LocationSubscription, ManualLocationSource, PositionSample};
pub use monitor::{EventBus, EventKind, EventPayload, EventStream, SessionId, SubscriptionId, ZoneEvent};
pub use resolver::{PrimaryZoneResolver, RiskRankPolicy};
pub use session::{MonitoringSession, SessionOptions};
pub use source::{BundledZones, FnZoneSource, ZoneSource};
pub use stability::{StabilityConfig, StabilityFilter, Transition, ZoneRuntimeState};
pub use storage::{InMemoryZoneCache, StorageError, ZoneCache};
pub use store::{ZoneOrigin, ZoneSnapshot, ZoneStore};
pub use transitions::{TransitionKind, TransitionLog, TransitionRecord};
pub use zone::{Zone, ZoneId, ZoneRecord, ZoneShape};

#[cfg(feature = "persistent")]
pub use storage::{FileCacheConfig, FileZoneCache};
