//! Mappers from the published zone datasets into [`ZoneRecord`]s.
//!
//! Two input shapes are supported: flat string rows as exported from the
//! disaster, security and wildlife CSV datasets, and the GeoJSON
//! `FeatureCollection` served by the dynamic risk grid. Mapping never fails
//! per row; a row with unusable coordinates yields a record that
//! [`Zone::from_record`](crate::Zone::from_record) rejects.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::SourceError;
use crate::resolver::{rank_label, score_to_rank};
use crate::zone::ZoneRecord;

/// Radius of one dynamic risk grid cell.
pub const GRID_RADIUS_KM: f64 = 0.25;

/// Radius given to disaster-area rows.
pub const DISASTER_RADIUS_KM: f64 = 5.0;

/// Category assigned to dynamic risk cells.
pub const DYNAMIC_CATEGORY: &str = "Dynamic Risk Zone";

/// A CSV row keyed by column header.
pub type DatasetRow = HashMap<String, String>;

/// The CSV datasets with a known column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Disaster-prone areas: 5 km circles, risk from `Additional_Info`.
    Disaster,
    /// Security zones: circles when `Buffer_Zone_Km > 0`, points otherwise.
    Security,
    /// Wildlife sightings and sanctuaries: points.
    Wildlife,
}

impl DatasetKind {
    /// Id prefix for rows of this dataset.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Disaster => "disaster",
            Self::Security => "security",
            Self::Wildlife => "wildlife",
        }
    }
}

/// First non-blank value among `keys`.
fn field<'a>(row: &'a DatasetRow, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn coordinate(row: &DatasetRow, keys: &[&str]) -> JsonValue {
    field(row, keys)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map_or(JsonValue::Null, |v| json!(v))
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn row_metadata(row: &DatasetRow) -> Map<String, JsonValue> {
    row.iter()
        .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
        .collect()
}

fn strip_risk_prefix(info: &str) -> Option<String> {
    let level = info.replace("Risk Level: ", "");
    let level = level.trim();
    (!level.is_empty()).then(|| level.to_string())
}

/// Maps one CSV row; `index` is the row's position in its file.
#[must_use]
pub fn map_row(kind: DatasetKind, row: &DatasetRow, index: usize) -> ZoneRecord {
    let lat = coordinate(row, &["Latitude", "Lat"]);
    let lng = coordinate(row, &["Longitude", "Lon"]);

    let (id, shape_type, radius_km, risk_label) = match kind {
        DatasetKind::Disaster => (
            format!("disaster-{index}"),
            "circle",
            Some(DISASTER_RADIUS_KM),
            field(row, &["Additional_Info"]).and_then(strip_risk_prefix),
        ),
        DatasetKind::Security => {
            let buffer_km = field(row, &["Buffer_Zone_Km"])
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0);
            let id = field(row, &["ID"]).map_or_else(|| index.to_string(), str::to_string);
            (
                format!("security-{id}"),
                if buffer_km.is_some() { "circle" } else { "point" },
                buffer_km,
                owned(field(row, &["Security_Level"])),
            )
        }
        DatasetKind::Wildlife => (format!("wildlife-{index}"), "point", None, None),
    };

    ZoneRecord {
        id,
        name: owned(field(row, &["Name"])),
        shape_type: shape_type.to_string(),
        coords: JsonValue::Array(vec![lat, lng]),
        radius_km,
        category: owned(field(row, &["Category"])),
        risk_label,
        source: owned(field(row, &["Source"])),
        metadata: Some(row_metadata(row)),
    }
}

/// Maps every row of one dataset, numbering rows from zero.
#[must_use]
pub fn map_rows(kind: DatasetKind, rows: &[DatasetRow]) -> Vec<ZoneRecord> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| map_row(kind, row, index))
        .collect()
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureProperties {
    grid_id: Option<String>,
    risk_score: Option<f64>,
    risk_level: Option<String>,
    grid_name: Option<String>,
    last_updated: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: JsonValue,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn feature_to_record(feature: Feature) -> Option<ZoneRecord> {
    let geometry = feature.geometry?;
    if geometry.kind != "Point" {
        return None;
    }
    let coords = geometry.coordinates.as_array()?;
    let lng = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;

    let props = feature.properties;
    let risk_score = props.risk_score.unwrap_or(0.0);
    let risk_level = non_blank(props.risk_level).unwrap_or_else(|| rank_label(score_to_rank(risk_score)).to_string());
    let grid_name = non_blank(props.grid_name);
    let name = grid_name.clone().unwrap_or_else(|| format!("Risk Zone ({risk_level})"));
    let id = non_blank(props.grid_id).unwrap_or_else(|| format!("dynamic-{lat}-{lng}"));

    let mut metadata = Map::new();
    metadata.insert("riskScore".to_string(), props.risk_score.map_or(JsonValue::Null, |s| json!(s)));
    metadata.insert("lastUpdated".to_string(), props.last_updated.unwrap_or(JsonValue::Null));
    metadata.insert("gridName".to_string(), grid_name.map_or(JsonValue::Null, JsonValue::String));

    Some(ZoneRecord {
        id,
        name: Some(name),
        shape_type: "circle".to_string(),
        coords: json!([lat, lng]),
        radius_km: Some(GRID_RADIUS_KM),
        category: Some(DYNAMIC_CATEGORY.to_string()),
        risk_label: Some(risk_level),
        source: Some("server".to_string()),
        metadata: Some(metadata),
    })
}

/// Maps a dynamic risk `FeatureCollection` into 0.25 km circle records.
///
/// Only `Point` features are used; GeoJSON `[lng, lat]` order is converted.
/// A missing `riskLevel` is derived from `riskScore`.
///
/// # Errors
///
/// Returns [`SourceError::Malformed`] when the document is not a
/// `FeatureCollection`.
pub fn dynamic_features(source_name: &str, document: &JsonValue) -> Result<Vec<ZoneRecord>, SourceError> {
    let collection = FeatureCollection::deserialize(document).map_err(|e| SourceError::Malformed {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })?;
    if collection.kind != "FeatureCollection" {
        return Err(SourceError::Malformed {
            source_name: source_name.to_string(),
            message: format!("expected FeatureCollection, got {}", collection.kind),
        });
    }

    let total = collection.features.len();
    let records: Vec<ZoneRecord> = collection.features.into_iter().filter_map(feature_to_record).collect();
    if records.len() < total {
        log::debug!("{source_name}: ignored {} non-point features", total - records.len());
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use crate::zone::{Zone, ZoneShape};

    fn row(pairs: &[(&str, &str)]) -> DatasetRow {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_disaster_row_is_five_km_circle() {
        let r = row(&[
            ("Name", "Flood Plain"),
            ("Lat", "26.1"),
            ("Lon", "91.7"),
            ("Category", "Flood"),
            ("Additional_Info", "Risk Level: High"),
            ("Source", "NDMA"),
        ]);
        let rec = map_row(DatasetKind::Disaster, &r, 3);
        assert_eq!(rec.id, "disaster-3");
        assert_eq!(rec.risk_label.as_deref(), Some("High"));
        let zone = Zone::from_record(rec, 1.0).unwrap();
        assert_eq!(zone.radius_km(), Some(DISASTER_RADIUS_KM));
        assert_eq!(zone.reference_point(), Some(LatLng::new(26.1, 91.7)));
        assert_eq!(zone.metadata.get("Category"), Some(&json!("Flood")));
    }

    #[test]
    fn test_security_row_shape_depends_on_buffer() {
        let with_buffer = row(&[
            ("ID", "17"),
            ("Name", "Border Post"),
            ("Latitude", "34.1"),
            ("Longitude", "74.8"),
            ("Buffer_Zone_Km", "2.5"),
            ("Security_Level", "Very High"),
        ]);
        let rec = map_row(DatasetKind::Security, &with_buffer, 0);
        assert_eq!(rec.id, "security-17");
        assert_eq!(rec.shape_type, "circle");
        assert_eq!(rec.radius_km, Some(2.5));

        let without = row(&[("Name", "Checkpoint"), ("Latitude", "34.1"), ("Longitude", "74.8"), ("Buffer_Zone_Km", "0")]);
        let rec = map_row(DatasetKind::Security, &without, 9);
        assert_eq!(rec.id, "security-9");
        assert_eq!(rec.shape_type, "point");
        assert_eq!(rec.radius_km, None);
    }

    #[test]
    fn test_wildlife_rows_numbered_and_unnamed_default() {
        let rows = vec![
            row(&[("Name", "Tiger Reserve"), ("Latitude", "21.6"), ("Longitude", "79.3")]),
            row(&[("Latitude", "22.0"), ("Longitude", "80.0")]),
        ];
        let recs = map_rows(DatasetKind::Wildlife, &rows);
        assert_eq!(recs[1].id, "wildlife-1");
        let zone = Zone::from_record(recs[1].clone(), 1.0).unwrap();
        assert_eq!(zone.name, "unnamed");
        assert!(matches!(zone.shape, ZoneShape::Point { .. }));
    }

    #[test]
    fn test_row_without_coordinates_is_rejected_downstream() {
        let rec = map_row(DatasetKind::Wildlife, &row(&[("Name", "Somewhere")]), 0);
        assert!(Zone::from_record(rec, 1.0).is_err());
    }

    #[test]
    fn test_dynamic_features_become_grid_circles() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"gridId": "g-1", "riskScore": 0.8, "riskLevel": "", "lastUpdated": "2024-05-01T00:00:00Z"},
                    "geometry": {"type": "Point", "coordinates": [77.2, 28.6]}
                },
                {
                    "type": "Feature",
                    "properties": {"riskScore": 0.3, "riskLevel": "Medium", "gridName": "Connaught Place"},
                    "geometry": {"type": "Point", "coordinates": [77.21, 28.63]}
                },
                {
                    "type": "Feature",
                    "properties": {"gridId": "poly"},
                    "geometry": {"type": "Polygon", "coordinates": []}
                }
            ]
        });
        let recs = dynamic_features("server", &doc).unwrap();
        assert_eq!(recs.len(), 2);

        assert_eq!(recs[0].id, "g-1");
        assert_eq!(recs[0].risk_label.as_deref(), Some("Very High"));
        assert_eq!(recs[0].name.as_deref(), Some("Risk Zone (Very High)"));
        assert_eq!(recs[0].coords, json!([28.6, 77.2]));
        assert_eq!(recs[0].radius_km, Some(GRID_RADIUS_KM));

        assert_eq!(recs[1].id, "dynamic-28.63-77.21");
        assert_eq!(recs[1].name.as_deref(), Some("Connaught Place"));
        assert_eq!(recs[1].category.as_deref(), Some(DYNAMIC_CATEGORY));
        let meta = recs[1].metadata.as_ref().unwrap();
        assert_eq!(meta.get("gridName"), Some(&json!("Connaught Place")));
    }

    #[test]
    fn test_dynamic_features_rejects_other_documents() {
        let err = dynamic_features("server", &json!({"type": "Feature", "features": []})).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
        assert!(dynamic_features("server", &json!([1, 2])).is_err());
    }
}
