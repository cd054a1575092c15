//! Zone data sources.
//!
//! The crate performs no network I/O. A host wraps its own fetch (HTTP,
//! bundled asset, database) in a [`ZoneSource`] and hands it to the store;
//! the store owns the fallback order and caching.

pub mod dataset;

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::SourceError;
use crate::geo::LatLng;
use crate::zone::{Zone, ZoneRecord};

pub use dataset::{dynamic_features, map_row, map_rows, DatasetKind, DatasetRow};

/// A provider of zone definition records.
pub trait ZoneSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetches the current zone records, optionally scoped to `near`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Unavailable`] when the source cannot be reached,
    /// [`SourceError::Malformed`] when it answers with unusable data.
    fn fetch(&self, near: Option<LatLng>) -> Result<Vec<ZoneRecord>, SourceError>;
}

/// Zone records shipped with the host application.
#[derive(Debug, Clone)]
pub struct BundledZones {
    name: String,
    records: Vec<ZoneRecord>,
}

impl BundledZones {
    /// Wraps already-parsed records.
    #[must_use]
    pub fn from_records(records: Vec<ZoneRecord>) -> Self {
        Self {
            name: "bundled".to_string(),
            records,
        }
    }

    /// Parses a JSON array of records.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if the text is not an array of records.
    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        serde_json::from_str(json)
            .map(Self::from_records)
            .map_err(|e| malformed("bundled", &e))
    }

    /// Parses a JSON array of records from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] on invalid JSON or I/O failure.
    pub fn from_reader(reader: impl Read) -> Result<Self, SourceError> {
        serde_json::from_reader(reader)
            .map(Self::from_records)
            .map_err(|e| malformed("bundled", &e))
    }

    /// Reads a JSON array of records from a file.
    ///
    /// # Errors
    ///
    /// [`SourceError::Unavailable`] if the file cannot be opened,
    /// [`SourceError::Malformed`] if it cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| SourceError::Unavailable {
            source_name: "bundled".to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Overrides the name reported in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The bundled records.
    #[must_use]
    pub fn records(&self) -> &[ZoneRecord] {
        &self.records
    }
}

impl ZoneSource for BundledZones {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _near: Option<LatLng>) -> Result<Vec<ZoneRecord>, SourceError> {
        Ok(self.records.clone())
    }
}

/// Adapts a closure into a [`ZoneSource`]; the usual way to plug in a remote fetch.
pub struct FnZoneSource<F> {
    name: String,
    fetch: F,
}

impl<F> FnZoneSource<F>
where
    F: Fn(Option<LatLng>) -> Result<Vec<ZoneRecord>, SourceError> + Send + Sync,
{
    /// Creates a named source calling `fetch`.
    pub fn new(name: impl Into<String>, fetch: F) -> Self {
        Self {
            name: name.into(),
            fetch,
        }
    }
}

impl<F> fmt::Debug for FnZoneSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnZoneSource").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F> ZoneSource for FnZoneSource<F>
where
    F: Fn(Option<LatLng>) -> Result<Vec<ZoneRecord>, SourceError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, near: Option<LatLng>) -> Result<Vec<ZoneRecord>, SourceError> {
        (self.fetch)(near)
    }
}

fn malformed(source_name: &str, err: &serde_json::Error) -> SourceError {
    SourceError::Malformed {
        source_name: source_name.to_string(),
        message: err.to_string(),
    }
}

/// Converts records into zones.
///
/// Invalid records are skipped with a warning. When two records share an id
/// the first one wins.
#[must_use]
pub fn records_to_zones(source_name: &str, records: Vec<ZoneRecord>, default_radius_km: f64) -> Vec<Zone> {
    let mut seen = HashSet::new();
    let mut zones = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for record in records {
        match Zone::from_record(record, default_radius_km) {
            Ok(zone) => {
                if seen.insert(zone.id.clone()) {
                    zones.push(zone);
                } else {
                    skipped += 1;
                    log::warn!("{source_name}: duplicate zone id '{}', keeping the first", zone.id);
                }
            }
            Err(e) => {
                skipped += 1;
                log::warn!("{source_name}: skipping zone record: {e}");
            }
        }
    }

    if skipped > 0 {
        log::info!("{source_name}: accepted {} zones, skipped {skipped}", zones.len());
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BUNDLE: &str = r#"[
        {"id": "a", "name": "Alpha", "type": "circle", "coords": [10.0, 10.0], "radiusKm": 2, "riskLevel": "High"},
        {"id": "b", "name": "Beta", "type": "point", "coords": [10.5, 10.5], "state": "Goa", "version": "3"},
        {"id": "c", "name": "Gamma", "type": "polygon", "coords": [[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]]}
    ]"#;

    #[test]
    fn test_bundled_zones_parse_and_fetch() {
        let bundle = BundledZones::from_json_str(BUNDLE).unwrap();
        assert_eq!(bundle.name(), "bundled");
        let records = bundle.fetch(None).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].risk_label.as_deref(), Some("High"));
    }

    #[test]
    fn test_bundled_zones_reject_non_array() {
        let err = BundledZones::from_json_str(r#"{"zones": []}"#).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_missing_bundle_file_is_unavailable() {
        let err = BundledZones::from_path("/nonexistent/zonewatch/bundle.json").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn test_fn_source_passes_position() {
        let source = FnZoneSource::new("remote", |near: Option<LatLng>| {
            let near = near.ok_or_else(|| SourceError::Unavailable {
                source_name: "remote".to_string(),
                message: "position required".to_string(),
            })?;
            Ok(vec![ZoneRecord {
                id: "here".to_string(),
                name: None,
                shape_type: "point".to_string(),
                coords: json!([near.lat, near.lng]),
                radius_km: None,
                category: None,
                risk_label: None,
                source: Some("server".to_string()),
                metadata: None,
            }])
        });
        assert!(source.fetch(None).is_err());
        let recs = source.fetch(Some(LatLng::new(1.0, 2.0))).unwrap();
        assert_eq!(recs[0].coords, json!([1.0, 2.0]));
    }

    #[test]
    fn test_records_to_zones_skips_invalid_and_duplicates() {
        let mut records = BundledZones::from_json_str(BUNDLE).unwrap().fetch(None).unwrap();
        let mut dup = records[0].clone();
        dup.name = Some("Alpha again".to_string());
        records.push(dup);
        let mut bad = records[1].clone();
        bad.id = "bad".to_string();
        bad.shape_type = "area".to_string();
        records.push(bad);

        let zones = records_to_zones("test", records, 1.0);
        let ids: Vec<&str> = zones.iter().map(|z| z.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(zones[0].name, "Alpha");
    }
}
