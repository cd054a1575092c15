//! Zone definitions and record normalization.
//!
//! A [`Zone`] is immutable once loaded. Zone data sources deliver loosely typed
//! [`ZoneRecord`]s; [`Zone::from_record`] turns them into zones with their
//! geometry invariants established, so nothing on the evaluation path ever has
//! to repair geometry.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ValidationError;
use crate::geo::{centroid, haversine_km, normalize_lat_lng, normalize_polygon, LatLng};

/// Radius applied to circle zones with a missing or invalid radius.
pub const DEFAULT_CIRCLE_RADIUS_KM: f64 = 1.0;

/// Stable zone identity as delivered by the zone data source.
///
/// Ordering is lexicographic and is used as the final primary-zone tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    /// Creates a zone id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ZoneId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Zone geometry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneShape {
    /// A single location with fixed proximity thresholds.
    Point {
        center: LatLng,
    },

    /// A great-circle disc.
    Circle {
        center: LatLng,
        radius_km: f64,
    },

    /// A ring of vertices, counter-clockwise and implicitly closed.
    Polygon {
        vertices: Vec<LatLng>,
    },
}

impl ZoneShape {
    /// Short lowercase name of the shape kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Point { .. } => "point",
            Self::Circle { .. } => "circle",
            Self::Polygon { .. } => "polygon",
        }
    }

    fn normalized(self, default_radius_km: f64) -> Self {
        match self {
            Self::Circle { center, radius_km } => Self::Circle {
                center,
                radius_km: sanitize_radius(Some(radius_km), default_radius_km),
            },
            Self::Polygon { vertices } => Self::Polygon {
                vertices: normalize_polygon(&vertices),
            },
            point @ Self::Point { .. } => point,
        }
    }
}

fn sanitize_radius(radius_km: Option<f64>, default_radius_km: f64) -> f64 {
    match radius_km {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => default_radius_km,
    }
}

/// A named geographic zone.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form risk label ("High", "Risk Level: Medium", "0.82", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_label: Option<String>,
    /// Origin tag of the record (dataset or service name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub shape: ZoneShape,
    /// Opaque key/value bag, passed through unmodified.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, JsonValue>,
}

impl Zone {
    fn with_shape(id: impl Into<ZoneId>, name: impl Into<String>, shape: ZoneShape) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            risk_label: None,
            source: None,
            shape,
            metadata: Map::new(),
        }
    }

    /// Creates a point zone.
    #[must_use]
    pub fn point(id: impl Into<ZoneId>, name: impl Into<String>, center: LatLng) -> Self {
        Self::with_shape(id, name, ZoneShape::Point { center })
    }

    /// Creates a circle zone; an invalid radius falls back to [`DEFAULT_CIRCLE_RADIUS_KM`].
    #[must_use]
    pub fn circle(
        id: impl Into<ZoneId>,
        name: impl Into<String>,
        center: LatLng,
        radius_km: f64,
    ) -> Self {
        Self::with_shape(
            id,
            name,
            ZoneShape::Circle {
                center,
                radius_km: sanitize_radius(Some(radius_km), DEFAULT_CIRCLE_RADIUS_KM),
            },
        )
    }

    /// Creates a polygon zone, normalizing the ring.
    #[must_use]
    pub fn polygon(id: impl Into<ZoneId>, name: impl Into<String>, vertices: &[LatLng]) -> Self {
        Self::with_shape(
            id,
            name,
            ZoneShape::Polygon {
                vertices: normalize_polygon(vertices),
            },
        )
    }

    /// Sets the risk label.
    #[must_use]
    pub fn with_risk_label(mut self, label: impl Into<String>) -> Self {
        self.risk_label = Some(label.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Inserts one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Re-establishes geometry invariants.
    ///
    /// Idempotent. Used when zones arrive from somewhere other than
    /// [`Zone::from_record`], such as a cache file.
    #[must_use]
    pub fn normalized(mut self, default_radius_km: f64) -> Self {
        self.shape = self.shape.normalized(default_radius_km);
        self
    }

    /// Circle radius; `None` for points and polygons.
    #[must_use]
    pub fn radius_km(&self) -> Option<f64> {
        match self.shape {
            ZoneShape::Circle { radius_km, .. } => Some(radius_km),
            _ => None,
        }
    }

    /// Center for points and circles, vertex centroid for polygons.
    #[must_use]
    pub fn reference_point(&self) -> Option<LatLng> {
        match &self.shape {
            ZoneShape::Point { center } | ZoneShape::Circle { center, .. } => Some(*center),
            ZoneShape::Polygon { vertices } => centroid(vertices),
        }
    }

    /// Distance from `point` to the zone's reference point.
    #[must_use]
    pub fn distance_km(&self, point: LatLng) -> Option<f64> {
        self.reference_point().map(|r| haversine_km(point, r))
    }

    /// Builds a zone from a data-source record.
    ///
    /// Coordinates delivered as `[lng, lat]` are swapped back, polygons are
    /// normalized, and circles without a positive finite radius get
    /// `default_radius_km`. A polygon whose ring degenerates is still accepted
    /// (it never contains anything); the evaluator reports it as a geometry
    /// fault.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` when the id is empty, the shape type is
    /// unknown, or the coordinates cannot be read.
    pub fn from_record(record: ZoneRecord, default_radius_km: f64) -> Result<Self, ValidationError> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::MissingField {
                field: "id".to_string(),
            });
        }

        let shape = match record.shape_type.trim().to_ascii_lowercase().as_str() {
            "point" => ZoneShape::Point {
                center: parse_pair(&id, &record.coords)?,
            },
            "circle" => ZoneShape::Circle {
                center: parse_pair(&id, &record.coords)?,
                radius_km: sanitize_radius(record.radius_km, default_radius_km),
            },
            "polygon" => {
                let ring = parse_ring(&id, &record.coords)?;
                let vertices = normalize_polygon(&ring);
                if vertices.is_empty() {
                    log::warn!("zone '{id}': polygon with {} vertices degenerates after normalization", ring.len());
                }
                ZoneShape::Polygon { vertices }
            }
            other => {
                return Err(ValidationError::UnknownShapeType {
                    zone_id: id,
                    shape_type: other.to_string(),
                })
            }
        };

        let name = record
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "unnamed".to_string());

        Ok(Self {
            id: ZoneId(id),
            name,
            category: non_empty(record.category),
            risk_label: non_empty(record.risk_label),
            source: non_empty(record.source),
            shape,
            metadata: record.metadata.unwrap_or_default(),
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn invalid(zone_id: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidCoordinates {
        zone_id: zone_id.to_string(),
        reason: reason.into(),
    }
}

fn parse_pair(zone_id: &str, coords: &JsonValue) -> Result<LatLng, ValidationError> {
    let Some(items) = coords.as_array() else {
        return Err(invalid(zone_id, "expected [lat, lng]"));
    };
    if items.len() < 2 {
        return Err(invalid(zone_id, format!("expected 2 numbers, got {}", items.len())));
    }
    let (Some(a), Some(b)) = (number(&items[0]), number(&items[1])) else {
        return Err(invalid(zone_id, "coordinates must be numbers"));
    };
    let p = normalize_lat_lng(a, b);
    if !p.is_finite() {
        return Err(invalid(zone_id, "coordinates must be finite"));
    }
    Ok(p)
}

fn parse_ring(zone_id: &str, coords: &JsonValue) -> Result<Vec<LatLng>, ValidationError> {
    let Some(items) = coords.as_array() else {
        return Err(invalid(zone_id, "expected [[lat, lng], ...]"));
    };
    items.iter().map(|pair| parse_pair(zone_id, pair)).collect()
}

/// Accepts JSON numbers and numeric strings (CSV-derived datasets carry both).
fn number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Zone definition as delivered by a zone data source.
///
/// `coords` is `[lat, lng]` for points and circles and `[[lat, lng], ...]` for
/// polygons.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "type")]
    pub shape_type: String,
    pub coords: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "radiusKm")]
    pub radius_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "riskLevel")]
    pub risk_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, JsonValue>>,
}
