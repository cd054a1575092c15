//! Raw containment classification of a position against one zone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GeometryFault;
use crate::geo::{haversine_km, point_in_polygon, LatLng};
use crate::zone::{Zone, ZoneShape};

/// Extra distance beyond a circle's radius that still counts as approaching.
pub const CIRCLE_APPROACH_MARGIN_KM: f64 = 0.5;

/// Point zones: inside within this distance.
pub const POINT_INSIDE_KM: f64 = 0.2;

/// Point zones: approaching within this distance.
pub const POINT_APPROACH_KM: f64 = 1.0;

/// Containment of a position relative to a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// Not near the zone.
    #[default]
    Outside,
    /// Within the approach band of a point or circle zone.
    Approaching,
    /// Within the zone.
    Inside,
}

impl Containment {
    /// Returns true for [`Containment::Inside`].
    #[must_use]
    pub const fn is_inside(self) -> bool {
        matches!(self, Self::Inside)
    }
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outside => write!(f, "outside"),
            Self::Approaching => write!(f, "approaching"),
            Self::Inside => write!(f, "inside"),
        }
    }
}

fn banded(distance_km: f64, inside_km: f64, approach_km: f64) -> Containment {
    if distance_km <= inside_km {
        Containment::Inside
    } else if distance_km <= approach_km {
        Containment::Approaching
    } else {
        Containment::Outside
    }
}

/// Classifies `point` against `zone`, reporting malformed geometry.
///
/// Polygons only ever classify as inside or outside; there is no approach band.
///
/// # Errors
///
/// Returns a [`GeometryFault`] for a non-finite position, non-finite zone
/// coordinates, an invalid circle radius, or a polygon with fewer than three
/// vertices.
pub fn evaluate(zone: &Zone, point: LatLng) -> Result<Containment, GeometryFault> {
    if !point.is_finite() {
        return Err(GeometryFault::NonFinitePosition {
            lat: point.lat,
            lng: point.lng,
        });
    }

    match &zone.shape {
        ZoneShape::Circle { center, radius_km } => {
            if !center.is_finite() {
                return Err(GeometryFault::NonFiniteCoordinate { zone_id: zone.id.clone() });
            }
            if !(radius_km.is_finite() && *radius_km > 0.0) {
                return Err(GeometryFault::InvalidRadius {
                    zone_id: zone.id.clone(),
                    radius_km: *radius_km,
                });
            }
            let d = haversine_km(point, *center);
            Ok(banded(d, *radius_km, radius_km + CIRCLE_APPROACH_MARGIN_KM))
        }
        ZoneShape::Point { center } => {
            if !center.is_finite() {
                return Err(GeometryFault::NonFiniteCoordinate { zone_id: zone.id.clone() });
            }
            let d = haversine_km(point, *center);
            Ok(banded(d, POINT_INSIDE_KM, POINT_APPROACH_KM))
        }
        ZoneShape::Polygon { vertices } => {
            if vertices.len() < 3 {
                return Err(GeometryFault::DegeneratePolygon {
                    zone_id: zone.id.clone(),
                    vertices: vertices.len(),
                });
            }
            if !vertices.iter().all(LatLng::is_finite) {
                return Err(GeometryFault::NonFiniteCoordinate { zone_id: zone.id.clone() });
            }
            if point_in_polygon(point, vertices) {
                Ok(Containment::Inside)
            } else {
                Ok(Containment::Outside)
            }
        }
    }
}

/// Classifies `point` against `zone`; malformed geometry is [`Containment::Outside`].
#[must_use]
pub fn classify(zone: &Zone, point: LatLng) -> Containment {
    evaluate(zone, point).unwrap_or(Containment::Outside)
}
