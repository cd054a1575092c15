use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use zonewatch::config::DEFAULT_CACHE_KEY;
use zonewatch::source::dynamic_features;
use zonewatch::{
    BundledZones, FnZoneSource, Geofencer, InMemoryZoneCache, LatLng, SourceError, Zone, ZoneCache, ZoneOrigin,
    ZoneRecord, ZoneSource,
};

fn record(id: &str, lat: f64, lng: f64) -> ZoneRecord {
    ZoneRecord {
        id: id.to_string(),
        name: Some(format!("Zone {id}")),
        shape_type: "circle".to_string(),
        coords: json!([lat, lng]),
        radius_km: Some(1.0),
        category: None,
        risk_label: Some("Medium".to_string()),
        source: Some("server".to_string()),
        metadata: None,
    }
}

fn remote_with(records: Vec<ZoneRecord>) -> Arc<dyn ZoneSource> {
    Arc::new(FnZoneSource::new("remote", move |_: Option<LatLng>| Ok(records.clone())))
}

fn failing_remote() -> Arc<dyn ZoneSource> {
    Arc::new(FnZoneSource::new("remote", |_: Option<LatLng>| {
        Err(SourceError::Unavailable {
            source_name: "remote".to_string(),
            message: "connection refused".to_string(),
        })
    }))
}

fn bundled() -> Arc<dyn ZoneSource> {
    Arc::new(BundledZones::from_records(vec![record("bundled-1", 1.0, 1.0)]))
}

fn ids(geofencer: &Geofencer) -> Vec<String> {
    geofencer.get_zones().zones().iter().map(|z| z.id.to_string()).collect()
}

#[test]
fn cache_hit_wins_over_sources() {
    let cache = Arc::new(InMemoryZoneCache::with_entry(
        DEFAULT_CACHE_KEY,
        vec![Zone::point("cached", "Cached", LatLng::new(0.0, 0.0))],
    ));
    let geofencer = Geofencer::builder()
        .cache(cache)
        .bundled(bundled())
        .build()
        .unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Cache);
    assert_eq!(ids(&geofencer), vec!["cached"]);
    assert_eq!(geofencer.get_zones().origin(), ZoneOrigin::Cache);
}

#[test]
fn cache_hit_refreshes_from_remote_in_background() {
    let cache = Arc::new(InMemoryZoneCache::with_entry(
        DEFAULT_CACHE_KEY,
        vec![Zone::point("cached", "Cached", LatLng::new(0.0, 0.0))],
    ));
    let geofencer = Geofencer::builder()
        .cache(cache.clone())
        .remote(remote_with(vec![record("fresh", 2.0, 2.0)]))
        .build()
        .unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Cache);

    let deadline = Instant::now() + Duration::from_secs(5);
    while geofencer.get_zones().origin() != ZoneOrigin::Remote {
        assert!(Instant::now() < deadline, "background refresh did not land");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(ids(&geofencer), vec!["fresh"]);
    let cached = cache.read(DEFAULT_CACHE_KEY).unwrap().unwrap();
    assert_eq!(cached[0].id.as_str(), "fresh");
}

#[test]
fn remote_success_is_written_to_cache() {
    let cache = Arc::new(InMemoryZoneCache::new());
    let geofencer = Geofencer::builder()
        .cache(cache.clone())
        .remote(remote_with(vec![record("r1", 1.0, 1.0), record("r2", 2.0, 2.0)]))
        .bundled(bundled())
        .build()
        .unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Remote);
    assert_eq!(ids(&geofencer), vec!["r1", "r2"]);
    assert_eq!(cache.read(DEFAULT_CACHE_KEY).unwrap().unwrap().len(), 2);
}

#[test]
fn remote_failure_falls_back_to_bundled() {
    let cache = Arc::new(InMemoryZoneCache::new());
    let geofencer = Geofencer::builder()
        .cache(cache.clone())
        .remote(failing_remote())
        .bundled(bundled())
        .build()
        .unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Bundled);
    assert_eq!(ids(&geofencer), vec!["bundled-1"]);
    assert!(cache.read(DEFAULT_CACHE_KEY).unwrap().is_some());
}

#[test]
fn empty_remote_counts_as_miss() {
    let geofencer = Geofencer::builder()
        .remote(remote_with(Vec::new()))
        .bundled(bundled())
        .build()
        .unwrap();
    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Bundled);
}

#[test]
fn nothing_available_yields_empty_set() {
    let geofencer = Geofencer::builder()
        .cache(Arc::new(InMemoryZoneCache::new()))
        .remote(failing_remote())
        .build()
        .unwrap();
    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Empty);
    assert!(geofencer.get_zones().is_empty());
}

#[test]
fn remote_receives_position_hint() {
    let seen: Arc<Mutex<Option<LatLng>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let remote = FnZoneSource::new("remote", move |near: Option<LatLng>| {
        *sink.lock().unwrap() = near;
        Ok(vec![record("near", 5.0, 5.0)])
    });
    let geofencer = Geofencer::builder().remote(Arc::new(remote)).build().unwrap();
    geofencer.load_zones(Some(LatLng::new(5.0, 5.0)));
    assert_eq!(*seen.lock().unwrap(), Some(LatLng::new(5.0, 5.0)));
}

#[test]
fn refresh_failure_keeps_current_zones() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let remote = FnZoneSource::new("remote", move |_: Option<LatLng>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(vec![record("r1", 1.0, 1.0)])
        } else {
            Err(SourceError::Unavailable {
                source_name: "remote".to_string(),
                message: "timeout".to_string(),
            })
        }
    });
    let geofencer = Geofencer::builder().remote(Arc::new(remote)).build().unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Remote);
    let generation = geofencer.get_zones().generation();
    assert!(geofencer.refresh_zones(None).is_err());
    assert_eq!(geofencer.get_zones().generation(), generation);
    assert_eq!(ids(&geofencer), vec!["r1"]);
}

#[test]
fn unchanged_refresh_is_skipped() {
    let geofencer = Geofencer::builder()
        .remote(remote_with(vec![record("r1", 1.0, 1.0)]))
        .build()
        .unwrap();
    geofencer.load_zones(None);
    let generation = geofencer.get_zones().generation();

    assert!(!geofencer.refresh_zones(None).unwrap());
    assert_eq!(geofencer.get_zones().generation(), generation);

    let handle = geofencer.spawn_refresh(None).unwrap();
    assert!(!handle.join().unwrap());
}

#[test]
fn clear_cache_forces_source_reload() {
    let cache = Arc::new(InMemoryZoneCache::with_entry(
        DEFAULT_CACHE_KEY,
        vec![Zone::point("cached", "Cached", LatLng::new(0.0, 0.0))],
    ));
    let geofencer = Geofencer::builder()
        .cache(cache)
        .bundled(bundled())
        .build()
        .unwrap();
    geofencer.clear_cache().unwrap();
    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Bundled);
}

#[test]
fn distance_filter_sorts_nearest_first() {
    let geofencer = Geofencer::default();
    geofencer.set_zones(vec![
        Zone::point("far", "Far", LatLng::new(0.1, 0.0)),
        Zone::point("near", "Near", LatLng::new(0.01, 0.0)),
        Zone::point("out", "Out", LatLng::new(1.0, 0.0)),
    ]);
    let nearby = geofencer.zones_near(0.0, 0.0, None);
    let ids: Vec<&str> = nearby.iter().map(|(z, _)| z.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "far"]);
    assert!(nearby[0].1 < nearby[1].1);
    assert!(geofencer.filter_by_distance(0.0, 0.0, Some(0.5)).is_empty());
}

#[test]
fn dynamic_risk_features_load_as_grid_circles() {
    let document = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"gridId": "cell-1", "gridName": "Hot cell", "riskLevel": "High"},
            "geometry": {"type": "Point", "coordinates": [77.21, 28.61]}
        }]
    });
    let remote = FnZoneSource::new("dynamic", move |_: Option<LatLng>| dynamic_features("dynamic", &document));
    let geofencer = Geofencer::builder().remote(Arc::new(remote)).build().unwrap();

    assert_eq!(geofencer.load_zones(None), ZoneOrigin::Remote);
    let zones = geofencer.get_zones();
    let zone = &zones.zones()[0];
    assert_eq!(zone.radius_km(), Some(0.25));
    assert_eq!(zone.reference_point(), Some(LatLng::new(28.61, 77.21)));
}
