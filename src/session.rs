//! Monitoring sessions.
//!
//! A [`MonitoringSession`] owns all runtime state for one monitoring run: the
//! per-zone stability filter, the current primary zone and the event
//! sequence counter. Each position sample runs one evaluation pass:
//!
//! 1. take the current zone snapshot (once per pass),
//! 2. publish `Location`,
//! 3. classify every zone and feed the stability filter, publishing
//!    `StateChanged` then `Entered`/`Exited` for each commit in zone order,
//! 4. resolve the primary zone among committed-inside zones and publish
//!    `PrimaryChanged` when it differs.
//!
//! The pass holds the session mutex from start to the last publish. Samples
//! delivered concurrently are serialized and nothing is published once
//! [`MonitoringSession::stop`] has returned. Event handlers run under that
//! mutex, so they must not call any method of the session that published
//! the event (`on_sample`, `stop`, `is_active`, `primary_zone`, `zone_state`,
//! `inside_zones`, `events_published`); doing so deadlocks. The primary zone
//! and committed states are carried in the events themselves. Handlers may
//! register and remove bus handlers.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::config::GeofenceConfig;
use crate::containment::evaluate;
use crate::location::{LocationSource, LocationSubscription, PositionSample};
use crate::monitor::{EventBus, EventPayload, SessionId, ZoneEvent};
use crate::resolver::{PrimaryZoneResolver, RiskRankPolicy};
use crate::stability::{StabilityConfig, StabilityFilter, ZoneRuntimeState};
use crate::store::{ZoneSnapshot, ZoneStore};
use crate::zone::ZoneId;

/// Per-session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    /// Debounce and cooldown parameters.
    pub stability: StabilityConfig,
    /// Risk ranking used for primary zone resolution.
    pub risk_policy: RiskRankPolicy,
}

impl From<&GeofenceConfig> for SessionOptions {
    fn from(cfg: &GeofenceConfig) -> Self {
        Self {
            stability: cfg.stability(),
            risk_policy: cfg.risk_policy,
        }
    }
}

/// Runtime state of an active session.
#[derive(Debug)]
pub struct EngineState {
    snapshot: Arc<ZoneSnapshot>,
    filter: StabilityFilter,
    resolver: PrimaryZoneResolver,
    primary: Option<ZoneId>,
    sequence: u64,
    // Zones already reported as faulty for this snapshot.
    faulted: HashSet<ZoneId>,
}

impl EngineState {
    fn new(snapshot: Arc<ZoneSnapshot>, options: SessionOptions) -> Self {
        Self {
            snapshot,
            filter: StabilityFilter::new(options.stability),
            resolver: PrimaryZoneResolver::new(options.risk_policy),
            primary: None,
            sequence: 0,
            faulted: HashSet::new(),
        }
    }

    /// Adopts a newer snapshot, keeping state for surviving zone ids.
    fn adopt(&mut self, snapshot: Arc<ZoneSnapshot>) {
        {
            let live: HashSet<&ZoneId> = snapshot.zones().iter().map(|z| &z.id).collect();
            self.filter.retain_zones(&live);
        }
        log::debug!(
            "session: adopting zone generation {} ({} zones, {} tracked)",
            snapshot.generation(),
            snapshot.len(),
            self.filter.len()
        );
        self.faulted.clear();
        self.snapshot = snapshot;
    }

    /// Runs one evaluation pass and returns the payloads to publish, in order.
    fn run_pass(&mut self, sample: &PositionSample) -> Vec<EventPayload> {
        let position = sample.position;
        let mut payloads = vec![EventPayload::Location {
            sample: sample.clone(),
            primary: self.primary.clone(),
        }];

        let snapshot = Arc::clone(&self.snapshot);
        for zone in snapshot.zones() {
            let raw = match evaluate(zone, position) {
                Ok(raw) => raw,
                Err(fault) => {
                    if self.faulted.insert(zone.id.clone()) {
                        log::warn!("session: skipping zone '{}': {fault}", zone.id);
                    }
                    continue;
                }
            };
            let Some(transition) = self.filter.observe(&zone.id, raw, sample.timestamp) else {
                continue;
            };
            log::debug!(
                "session: zone '{}' {} -> {}",
                zone.id,
                transition.previous,
                transition.current
            );
            payloads.push(EventPayload::StateChanged {
                zone: Arc::clone(zone),
                previous: transition.previous,
                current: transition.current,
                position,
            });
            if transition.is_enter() {
                payloads.push(EventPayload::Entered {
                    zone: Arc::clone(zone),
                    position,
                });
            } else if transition.is_exit() {
                payloads.push(EventPayload::Exited {
                    zone: Arc::clone(zone),
                    position,
                });
            }
        }

        let filter = &self.filter;
        let primary = self.resolver.resolve(
            snapshot
                .zones()
                .iter()
                .filter(|z| filter.committed(&z.id).is_inside())
                .map(|z| &**z),
        );
        if primary != self.primary {
            payloads.push(EventPayload::PrimaryChanged {
                previous: self.primary.take(),
                current: primary.clone(),
            });
            self.primary = primary;
        }

        payloads
    }
}

struct SessionInner {
    id: SessionId,
    store: Arc<ZoneStore>,
    bus: Arc<EventBus>,
    state: Mutex<Option<EngineState>>,
}

impl SessionInner {
    fn on_sample(&self, sample: &PositionSample) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = guard.as_mut() else {
            return;
        };
        if !sample.position.is_finite() {
            log::warn!("session {}: ignoring non-finite position {}", self.id, sample.position);
            return;
        }

        let snapshot = self.store.snapshot();
        if snapshot.generation() != state.snapshot.generation() {
            state.adopt(snapshot);
        }

        let payloads = state.run_pass(sample);
        for payload in payloads {
            state.sequence += 1;
            let event = ZoneEvent::new(self.id, state.sequence, sample.timestamp, payload);
            self.bus.publish(&event);
        }
    }
}

/// An active monitoring run.
///
/// Created by [`MonitoringSession::start`] (or the `Geofencer` facade).
/// Stopping is idempotent and happens automatically on drop.
pub struct MonitoringSession {
    inner: Arc<SessionInner>,
    subscription: Mutex<Option<Box<dyn LocationSubscription>>>,
}

impl fmt::Debug for MonitoringSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringSession")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl MonitoringSession {
    /// Starts monitoring `store` against samples from `location`.
    ///
    /// The store should already be loaded; zones swapped in later are picked
    /// up at the next sample. Every zone starts out committed as outside.
    pub fn start(
        store: Arc<ZoneStore>,
        bus: Arc<EventBus>,
        location: &dyn LocationSource,
        options: SessionOptions,
    ) -> Self {
        let session = Self::detached(store, bus, options);
        let weak: Weak<SessionInner> = Arc::downgrade(&session.inner);
        let subscription = location.subscribe(Arc::new(move |sample: PositionSample| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sample(&sample);
            }
        }));
        *session.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);
        session
    }

    /// Starts a session with no location subscription; feed it with
    /// [`MonitoringSession::on_sample`].
    #[must_use]
    pub fn detached(store: Arc<ZoneStore>, bus: Arc<EventBus>, options: SessionOptions) -> Self {
        let id = SessionId::new();
        let snapshot = store.snapshot();
        log::info!(
            "session {id}: started with {} zones (generation {})",
            snapshot.len(),
            snapshot.generation()
        );
        Self {
            inner: Arc::new(SessionInner {
                id,
                store,
                bus,
                state: Mutex::new(Some(EngineState::new(snapshot, options))),
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Session identifier carried by every event.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Runs one evaluation pass for `sample`. A no-op once stopped.
    pub fn on_sample(&self, sample: &PositionSample) {
        self.inner.on_sample(sample);
    }

    /// Stops the session: unsubscribes from the location feed and discards
    /// all runtime state. Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        if let Some(mut subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            subscription.unsubscribe();
        }
        let was_active = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if was_active {
            log::info!("session {}: stopped", self.inner.id);
        }
        was_active
    }

    /// Returns true until [`MonitoringSession::stop`] is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn with_state<T>(&self, f: impl FnOnce(&EngineState) -> T) -> Option<T> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    /// Current primary zone.
    #[must_use]
    pub fn primary_zone(&self) -> Option<ZoneId> {
        self.with_state(|s| s.primary.clone()).flatten()
    }

    /// Runtime state of one zone, if it has been observed.
    #[must_use]
    pub fn zone_state(&self, id: &ZoneId) -> Option<ZoneRuntimeState> {
        self.with_state(|s| s.filter.state(id).cloned()).flatten()
    }

    /// Ids of zones currently committed as inside, in zone order.
    #[must_use]
    pub fn inside_zones(&self) -> Vec<ZoneId> {
        self.with_state(|s| {
            s.snapshot
                .zones()
                .iter()
                .filter(|z| s.filter.committed(&z.id).is_inside())
                .map(|z| z.id.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    /// Number of events published so far.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.with_state(|s| s.sequence).unwrap_or(0)
    }
}

impl Drop for MonitoringSession {
    fn drop(&mut self) {
        self.stop();
    }
}
