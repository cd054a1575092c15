//! Debounce and cooldown state machine, one instance per zone.
//!
//! Raw classifications only become committed state after they have been seen
//! `required` times in a row, and a zone never commits two transitions closer
//! together than the cooldown. Cooldown gates the commit itself: a suppressed
//! transition produces no state change and no event, but the candidate keeps
//! counting so the zone commits as soon as the cooldown expires.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::containment::Containment;
use crate::zone::ZoneId;

/// Consecutive identical raw classifications needed to commit.
pub const STABILITY_REQUIRED: u32 = 2;

/// Minimum time between two committed transitions of one zone.
pub const COOLDOWN_MS: i64 = 10_000;

/// Stability filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    /// Consecutive identical observations required (at least 1).
    pub required: u32,
    /// Minimum spacing between commits.
    pub cooldown: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            required: STABILITY_REQUIRED,
            cooldown: Duration::milliseconds(COOLDOWN_MS),
        }
    }
}

/// Runtime state of one zone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneRuntimeState {
    /// Currently accepted state.
    pub committed: Containment,
    /// Last raw classification seen.
    pub candidate: Option<Containment>,
    /// Consecutive occurrences of `candidate`.
    pub candidate_count: u32,
    /// Time of the last committed transition.
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// A committed transition of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the commit.
    pub previous: Containment,
    /// State after the commit.
    pub current: Containment,
    /// Commit time.
    pub at: DateTime<Utc>,
}

impl Transition {
    /// True when the zone went from not-inside to inside.
    #[must_use]
    pub const fn is_enter(&self) -> bool {
        !self.previous.is_inside() && self.current.is_inside()
    }

    /// True when the zone went from inside to not-inside.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        self.previous.is_inside() && !self.current.is_inside()
    }
}

/// Per-zone debounce/cooldown filter.
#[derive(Debug, Clone, Default)]
pub struct StabilityFilter {
    cfg: StabilityConfig,
    states: HashMap<ZoneId, ZoneRuntimeState>,
}

impl StabilityFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new(cfg: StabilityConfig) -> Self {
        Self {
            cfg: StabilityConfig {
                required: cfg.required.max(1),
                cooldown: cfg.cooldown.max(Duration::zero()),
            },
            states: HashMap::new(),
        }
    }

    /// The effective configuration.
    #[must_use]
    pub const fn config(&self) -> StabilityConfig {
        self.cfg
    }

    /// Feeds one raw classification observed at `at`.
    ///
    /// Returns the committed transition, if any. A timestamp earlier than the
    /// last transition counts as inside the cooldown.
    pub fn observe(&mut self, zone_id: &ZoneId, raw: Containment, at: DateTime<Utc>) -> Option<Transition> {
        let cfg = self.cfg;
        if !self.states.contains_key(zone_id) {
            self.states.insert(zone_id.clone(), ZoneRuntimeState::default());
        }
        let state = self.states.get_mut(zone_id)?;

        if state.candidate == Some(raw) {
            state.candidate_count = state.candidate_count.saturating_add(1);
        } else {
            state.candidate = Some(raw);
            state.candidate_count = 1;
        }

        let eligible = state.candidate_count >= cfg.required && raw != state.committed;
        if !eligible {
            return None;
        }

        let permitted = state
            .last_transition_at
            .map_or(true, |last| at.signed_duration_since(last) >= cfg.cooldown);
        if !permitted {
            return None;
        }

        let previous = state.committed;
        state.committed = raw;
        state.candidate_count = 0;
        state.last_transition_at = Some(at);

        Some(Transition {
            previous,
            current: raw,
            at,
        })
    }

    /// Committed state of a zone (Outside when never observed).
    #[must_use]
    pub fn committed(&self, zone_id: &ZoneId) -> Containment {
        self.states.get(zone_id).map(|s| s.committed).unwrap_or_default()
    }

    /// Runtime state of a zone, if it has been observed.
    #[must_use]
    pub fn state(&self, zone_id: &ZoneId) -> Option<&ZoneRuntimeState> {
        self.states.get(zone_id)
    }

    /// Drops state for zones not in `live`.
    pub fn retain_zones(&mut self, live: &HashSet<&ZoneId>) {
        self.states.retain(|id, _| live.contains(id));
    }

    /// Number of tracked zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no zone is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
