//! Engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ZoneError};
use crate::monitor::DEFAULT_STREAM_CAPACITY;
use crate::resolver::RiskRankPolicy;
use crate::stability::{StabilityConfig, COOLDOWN_MS, STABILITY_REQUIRED};
use crate::zone::DEFAULT_CIRCLE_RADIUS_KM;

/// Cache key under which the last-known zone list is stored.
pub const DEFAULT_CACHE_KEY: &str = "geofences:v1";

/// Capacity of the rolling transition log.
pub const DEFAULT_TRANSITION_LOG_CAPACITY: usize = 2000;

/// Default radius for "zones near me" queries.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 15.0;

/// Configuration for a [`Geofencer`](crate::Geofencer) and the sessions it starts.
///
/// Deserializable so hosts can keep it in their own config files; every field
/// falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    /// Consecutive identical raw classifications needed to commit a transition.
    pub stability_required: u32,
    /// Minimum milliseconds between two committed transitions of one zone.
    pub cooldown_ms: u64,
    /// Radius given to circle zones with a missing or invalid radius.
    pub default_radius_km: f64,
    /// How risk labels are ranked when resolving the primary zone.
    pub risk_policy: RiskRankPolicy,
    /// Cache key for the zone list.
    pub cache_key: String,
    /// Records kept by a transition log.
    pub transition_log_capacity: usize,
    /// Buffer size of event streams opened without an explicit capacity.
    pub stream_capacity: usize,
    /// Default radius for nearby-zone queries.
    pub nearby_radius_km: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            stability_required: STABILITY_REQUIRED,
            cooldown_ms: COOLDOWN_MS.unsigned_abs(),
            default_radius_km: DEFAULT_CIRCLE_RADIUS_KM,
            risk_policy: RiskRankPolicy::default(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            transition_log_capacity: DEFAULT_TRANSITION_LOG_CAPACITY,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ZoneError {
    ZoneError::Validation(ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    })
}

fn positive_finite(field: &str, value: f64) -> Result<(), ZoneError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive finite number (got {value})")))
    }
}

impl GeofenceConfig {
    /// Upper bound on the cooldown (one day).
    const MAX_COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidConfig`] naming the first bad field.
    pub fn validate(self) -> Result<Self, ZoneError> {
        if self.stability_required == 0 {
            return Err(invalid("stability_required", "must be at least 1"));
        }
        if self.cooldown_ms > Self::MAX_COOLDOWN_MS {
            return Err(invalid(
                "cooldown_ms",
                format!("must be at most {} (got {})", Self::MAX_COOLDOWN_MS, self.cooldown_ms),
            ));
        }
        positive_finite("default_radius_km", self.default_radius_km)?;
        positive_finite("nearby_radius_km", self.nearby_radius_km)?;
        if self.cache_key.trim().is_empty() {
            return Err(invalid("cache_key", "must not be empty"));
        }
        if self.transition_log_capacity == 0 {
            return Err(invalid("transition_log_capacity", "must be at least 1"));
        }
        if self.stream_capacity == 0 {
            return Err(invalid("stream_capacity", "must be at least 1"));
        }
        Ok(self)
    }

    /// Stability filter parameters derived from this config.
    #[must_use]
    pub fn stability(&self) -> StabilityConfig {
        let cooldown_ms = i64::try_from(self.cooldown_ms).unwrap_or(i64::MAX);
        StabilityConfig {
            required: self.stability_required,
            cooldown: Duration::milliseconds(cooldown_ms),
        }
    }
}
