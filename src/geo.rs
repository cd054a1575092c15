//! Spherical and planar geometry primitives.
//!
//! Distances are great-circle distances on a sphere of mean Earth radius.
//! Polygon tests are planar, treating longitude as x and latitude as y, which
//! is accurate enough at geofence scale and away from the antimeridian.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
///
/// # Examples
///
/// ```
/// use zonewatch::geo::{haversine_km, LatLng};
///
/// let a = LatLng::new(10.0, 10.0);
/// assert_eq!(haversine_km(a, a), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl LatLng {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns true if both components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Returns true if the pair is finite and within latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two points in kilometers.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for near-antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Even-odd ray casting test.
///
/// `vertices` must already be normalized (see [`normalize_polygon`]); the ring
/// is closed implicitly. Fewer than three vertices never contain anything.
/// Points on an edge fall on whichever side the half-open crossing rule puts
/// them, which is stable for identical input.
#[must_use]
pub fn point_in_polygon(point: LatLng, vertices: &[LatLng]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let x = point.lng;
    let y = point.lat;
    let mut inside = false;

    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].lng, vertices[i].lat);
        let (xj, yj) = (vertices[j].lng, vertices[j].lat);

        if (yi > y) != (yj > y) {
            let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

/// Twice the signed area of a ring in the lng/lat plane (positive when counter-clockwise).
fn signed_area2(vertices: &[LatLng]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            a.lng * b.lat - b.lng * a.lat
        })
        .sum()
}

/// Canonicalizes a polygon ring.
///
/// Drops non-finite vertices, collapses consecutive duplicates and an explicit
/// closing vertex, and orients the ring counter-clockwise. Returns an empty
/// ring when fewer than three distinct vertices remain or the ring has no area.
#[must_use]
pub fn normalize_polygon(vertices: &[LatLng]) -> Vec<LatLng> {
    let mut out: Vec<LatLng> = Vec::with_capacity(vertices.len());
    for v in vertices.iter().copied().filter(LatLng::is_finite) {
        if out.last() != Some(&v) {
            out.push(v);
        }
    }

    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }

    if out.len() < 3 {
        return Vec::new();
    }

    let area2 = signed_area2(&out);
    if area2 == 0.0 || !area2.is_finite() {
        return Vec::new();
    }
    if area2 < 0.0 {
        out.reverse();
    }

    out
}

/// Repairs coordinate pairs that arrive in `[lng, lat]` order.
///
/// Keeps `(a, b)` when it is a valid latitude/longitude, swaps when only the
/// reversed pair is valid, and otherwise returns the input unchanged.
#[must_use]
pub fn normalize_lat_lng(a: f64, b: f64) -> LatLng {
    let direct = LatLng::new(a, b);
    if direct.is_valid() {
        return direct;
    }
    let swapped = LatLng::new(b, a);
    if swapped.is_valid() {
        return swapped;
    }
    direct
}

/// Arithmetic mean of the vertices; `None` for an empty ring.
#[must_use]
pub fn centroid(vertices: &[LatLng]) -> Option<LatLng> {
    if vertices.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = vertices.len() as f64;
    let (lat, lng) = vertices
        .iter()
        .fold((0.0, 0.0), |(lat, lng), v| (lat + v.lat, lng + v.lng));
    Some(LatLng::new(lat / n, lng / n))
}
