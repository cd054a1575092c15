//! Error types for zonewatch.
//!
//! All errors are strongly typed using thiserror. Most of them never reach
//! callers of the hot path: the monitoring session degrades to "keep the last
//! known good state" and logs instead. They surface on the loading, caching
//! and configuration APIs.

use thiserror::Error;

use crate::storage::StorageError;
use crate::zone::ZoneId;

/// Validation errors raised while normalizing zone records or configuration.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A record lacks a required field.
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    /// The shape type is not point, circle or polygon.
    #[error("Zone '{zone_id}' has unknown shape type '{shape_type}'")]
    UnknownShapeType {
        zone_id: String,
        shape_type: String,
    },

    /// Coordinates do not fit the shape.
    #[error("Zone '{zone_id}' has invalid coordinates: {reason}")]
    InvalidCoordinates {
        zone_id: String,
        reason: String,
    },

    /// A configuration field is out of range.
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

/// A single zone's geometry cannot be evaluated.
///
/// Faults are isolated to the zone: the evaluation pass skips it and keeps going.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryFault {
    /// Fewer than three usable polygon vertices.
    #[error("Zone '{zone_id}' polygon has {vertices} usable vertices (need at least 3)")]
    DegeneratePolygon {
        zone_id: ZoneId,
        vertices: usize,
    },

    /// A zone coordinate is NaN or infinite.
    #[error("Zone '{zone_id}' has a non-finite coordinate")]
    NonFiniteCoordinate {
        zone_id: ZoneId,
    },

    /// A circle radius is not positive and finite.
    #[error("Zone '{zone_id}' has invalid radius {radius_km} km")]
    InvalidRadius {
        zone_id: ZoneId,
        radius_km: f64,
    },

    /// The evaluated position is NaN or infinite.
    #[error("Position ({lat}, {lng}) is not a finite coordinate")]
    NonFinitePosition {
        lat: f64,
        lng: f64,
    },
}

/// Errors reported by zone data sources.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("Zone source '{source_name}' is unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },

    /// The source answered with unusable data.
    #[error("Zone source '{source_name}' returned malformed data: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },
}

/// Execution errors from event streams.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The stream was unsubscribed or its bus dropped.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        /// Channel the receive was attempted on.
        path: String,
    },

    /// A bounded wait elapsed without a value.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        /// The wait that elapsed.
        duration_ms: u64,
    },
}

/// Top-level error type for zonewatch.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// Rejected configuration or zone record.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Cache backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Zone source failure.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Event stream failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl ZoneError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Source(e) => matches!(e, SourceError::Unavailable { .. }),
            Self::Storage(e) => matches!(e, StorageError::Io(_)),
            Self::Execution(e) => matches!(e, ExecutionError::Timeout { .. }),
        }
    }
}

/// Result type alias for zonewatch operations.
pub type ZoneResult<T> = Result<T, ZoneError>;
