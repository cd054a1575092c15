//! Consumer-facing facade.
//!
//! A [`Geofencer`] bundles the zone store, the event bus and the
//! configuration. It is cheap to share behind an `Arc`; every method takes
//! `&self`.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zonewatch::{BundledZones, EventKind, Geofencer, ManualLocationSource};
//!
//! let geofencer = Geofencer::builder()
//!     .bundled(Arc::new(BundledZones::from_path("assets/geofences-output.json")?))
//!     .build()?;
//! geofencer.load_zones(None);
//! geofencer.on(EventKind::Entered, |event| println!("entered {:?}", event.payload.zone()));
//!
//! let feed = ManualLocationSource::new();
//! let session = geofencer.start_monitoring(&feed, None);
//! feed.push(zonewatch::PositionSample::now(28.61, 77.21));
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::GeofenceConfig;
use crate::error::ZoneResult;
use crate::geo::LatLng;
use crate::location::LocationSource;
use crate::monitor::{EventBus, EventKind, EventStream, SubscriptionId, ZoneEvent};
use crate::session::{MonitoringSession, SessionOptions};
use crate::source::ZoneSource;
use crate::storage::ZoneCache;
use crate::store::{ZoneOrigin, ZoneSnapshot, ZoneStore, ZoneStoreBuilder};
use crate::transitions::TransitionLog;
use crate::zone::Zone;

/// Builder for [`Geofencer`].
#[derive(Default)]
pub struct GeofencerBuilder {
    config: GeofenceConfig,
    store: ZoneStoreBuilder,
}

impl GeofencerBuilder {
    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: GeofenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the zone cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ZoneCache>) -> Self {
        self.store = self.store.cache(cache);
        self
    }

    /// Sets the remote zone source.
    #[must_use]
    pub fn remote(mut self, source: Arc<dyn ZoneSource>) -> Self {
        self.store = self.store.remote(source);
        self
    }

    /// Sets the bundled fallback source.
    #[must_use]
    pub fn bundled(mut self, source: Arc<dyn ZoneSource>) -> Self {
        self.store = self.store.bundled(source);
        self
    }

    /// Validates the configuration and builds the facade.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid configuration.
    pub fn build(self) -> ZoneResult<Geofencer> {
        let config = self.config.validate()?;
        let store = self
            .store
            .cache_key(config.cache_key.clone())
            .default_radius_km(config.default_radius_km)
            .build();
        Ok(Geofencer {
            store: Arc::new(store),
            bus: Arc::new(EventBus::new()),
            config,
        })
    }
}

/// Geofence monitoring facade.
#[derive(Debug)]
pub struct Geofencer {
    store: Arc<ZoneStore>,
    bus: Arc<EventBus>,
    config: GeofenceConfig,
}

impl Default for Geofencer {
    fn default() -> Self {
        Self {
            store: Arc::new(ZoneStore::default()),
            bus: Arc::new(EventBus::new()),
            config: GeofenceConfig::default(),
        }
    }
}

impl Geofencer {
    /// Starts building a facade.
    #[must_use]
    pub fn builder() -> GeofencerBuilder {
        GeofencerBuilder::default()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GeofenceConfig {
        &self.config
    }

    /// The underlying zone store.
    #[must_use]
    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// The event bus sessions publish on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Registers an event handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ZoneEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    /// Removes an event handler.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.off(kind, id)
    }

    /// Opens an event stream with the configured buffer capacity.
    /// An empty `kinds` slice subscribes to everything.
    #[must_use]
    pub fn stream(&self, kinds: &[EventKind]) -> EventStream {
        self.bus.stream(kinds, self.config.stream_capacity)
    }

    /// Attaches a transition log with the configured capacity.
    #[must_use]
    pub fn transition_log(&self) -> TransitionLog {
        TransitionLog::attach(&self.bus, self.config.transition_log_capacity)
    }

    /// Loads zones through the cache, remote, bundled, empty chain.
    ///
    /// A cache hit also starts a background refresh from the remote source
    /// when one is configured.
    pub fn load_zones(&self, near: Option<LatLng>) -> ZoneOrigin {
        let origin = self.store.load(near);
        if origin == ZoneOrigin::Cache && self.store.has_remote() {
            if let Err(e) = self.store.spawn_refresh(near) {
                log::warn!("geofencer: could not start background refresh: {e}");
            }
        }
        origin
    }

    /// Re-fetches from the remote source on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the source error; the current zones stay in place.
    pub fn refresh_zones(&self, near: Option<LatLng>) -> ZoneResult<bool> {
        self.store.refresh(near)
    }

    /// Re-fetches from the remote source on a background thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn_refresh(&self, near: Option<LatLng>) -> std::io::Result<JoinHandle<bool>> {
        self.store.spawn_refresh(near)
    }

    /// Replaces the zone set directly.
    pub fn set_zones(&self, zones: Vec<Zone>) -> bool {
        self.store.replace(zones)
    }

    /// Deletes the cached zone list.
    ///
    /// # Errors
    ///
    /// Returns the cache backend error.
    pub fn clear_cache(&self) -> ZoneResult<()> {
        self.store.clear_cache()
    }

    /// The current zone snapshot.
    #[must_use]
    pub fn get_zones(&self) -> Arc<ZoneSnapshot> {
        self.store.snapshot()
    }

    /// Zones within `radius_km` (default from config) of a position, nearest first.
    #[must_use]
    pub fn filter_by_distance(&self, lat: f64, lng: f64, radius_km: Option<f64>) -> Vec<Arc<Zone>> {
        self.store.filter_by_distance(
            LatLng::new(lat, lng),
            Some(radius_km.unwrap_or(self.config.nearby_radius_km)),
        )
    }

    /// Like [`Geofencer::filter_by_distance`], with distances in km.
    #[must_use]
    pub fn zones_near(&self, lat: f64, lng: f64, radius_km: Option<f64>) -> Vec<(Arc<Zone>, f64)> {
        self.store.zones_near(
            LatLng::new(lat, lng),
            Some(radius_km.unwrap_or(self.config.nearby_radius_km)),
        )
    }

    /// Starts a monitoring session; `None` options are derived from the
    /// configuration.
    #[must_use]
    pub fn start_monitoring(&self, location: &dyn LocationSource, options: Option<SessionOptions>) -> MonitoringSession {
        let options = options.unwrap_or_else(|| SessionOptions::from(&self.config));
        MonitoringSession::start(Arc::clone(&self.store), Arc::clone(&self.bus), location, options)
    }

    /// Stops and discards a session.
    pub fn stop_monitoring(&self, session: MonitoringSession) {
        session.stop();
    }
}
