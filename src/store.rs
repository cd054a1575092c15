//! The loaded zone set.
//!
//! A [`ZoneStore`] holds one immutable [`ZoneSnapshot`] at a time behind an
//! `RwLock<Arc<_>>`. Readers clone the `Arc` and keep a consistent view for as
//! long as they need it; loads and refreshes build a complete new snapshot and
//! swap it in under the write lock. A refresh that yields the same zones
//! (by content fingerprint) leaves the current snapshot in place.
//!
//! Loading walks a fallback chain: cache, then remote source, then bundled
//! source, then an empty set. Empty results count as misses. A successful
//! remote or bundled load is written back to the cache; cache failures are
//! logged and never surface to the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_CACHE_KEY, DEFAULT_NEARBY_RADIUS_KM};
use crate::error::{SourceError, ZoneResult};
use crate::geo::LatLng;
use crate::source::{records_to_zones, ZoneSource};
use crate::storage::ZoneCache;
use crate::zone::{Zone, ZoneId, DEFAULT_CIRCLE_RADIUS_KM};

/// Name of the background refresh thread.
pub const REFRESH_THREAD_NAME: &str = "zonewatch-refresh";

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneOrigin {
    /// Nothing loaded, or every source failed.
    Empty,
    /// The persistent cache.
    Cache,
    /// The remote source.
    Remote,
    /// The bundled source.
    Bundled,
    /// Installed directly by the host.
    Manual,
}

impl fmt::Display for ZoneOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Cache => "cache",
            Self::Remote => "remote",
            Self::Bundled => "bundled",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// An immutable, indexed zone set.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    zones: Vec<Arc<Zone>>,
    index: HashMap<ZoneId, usize>,
    generation: u64,
    fingerprint: blake3::Hash,
    origin: ZoneOrigin,
    loaded_at: DateTime<Utc>,
}

/// Content fingerprint of a zone list; order-sensitive.
#[must_use]
pub fn fingerprint(zones: &[Arc<Zone>]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for zone in zones {
        match serde_json::to_vec(zone.as_ref()) {
            Ok(bytes) => {
                hasher.update(&(bytes.len() as u64).to_le_bytes());
                hasher.update(&bytes);
            }
            // Unserializable zones (non-finite metadata numbers) fall back to the id.
            Err(_) => {
                hasher.update(zone.id.as_str().as_bytes());
            }
        }
    }
    hasher.finalize()
}

impl ZoneSnapshot {
    fn build(zones: Vec<Arc<Zone>>, generation: u64, origin: ZoneOrigin, fingerprint: blake3::Hash) -> Self {
        let index = zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.id.clone(), i))
            .collect();
        Self {
            zones,
            index,
            generation,
            fingerprint,
            origin,
            loaded_at: Utc::now(),
        }
    }

    /// An empty generation-0 snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::build(Vec::new(), 0, ZoneOrigin::Empty, fingerprint(&[]))
    }

    /// Zones in load order.
    #[must_use]
    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// Looks up a zone by id.
    #[must_use]
    pub fn get(&self, id: &ZoneId) -> Option<&Arc<Zone>> {
        self.index.get(id).map(|&i| &self.zones[i])
    }

    /// Returns true if a zone with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &ZoneId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns true if there are no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Increments on every installed snapshot.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Content fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &blake3::Hash {
        &self.fingerprint
    }

    /// Where the zones came from.
    #[must_use]
    pub const fn origin(&self) -> ZoneOrigin {
        self.origin
    }

    /// When the snapshot was built.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Zones whose reference point lies within `radius_km` of `point`, with
    /// distances, nearest first. Ties keep load order.
    #[must_use]
    pub fn zones_near(&self, point: LatLng, radius_km: f64) -> Vec<(Arc<Zone>, f64)> {
        if !point.is_finite() || radius_km.is_nan() {
            return Vec::new();
        }
        let mut near: Vec<(Arc<Zone>, f64)> = self
            .zones
            .iter()
            .filter_map(|z| z.distance_km(point).map(|d| (Arc::clone(z), d)))
            .filter(|(_, d)| *d <= radius_km)
            .collect();
        near.sort_by(|a, b| a.1.total_cmp(&b.1));
        near
    }
}

/// Drops zones whose id was already seen; the first occurrence wins.
fn dedup_ids(zones: Vec<Arc<Zone>>, origin: ZoneOrigin) -> Vec<Arc<Zone>> {
    let mut seen = HashSet::with_capacity(zones.len());
    zones
        .into_iter()
        .filter(|z| {
            let fresh = seen.insert(z.id.clone());
            if !fresh {
                log::warn!("zone store: duplicate zone id '{}' from {origin}, keeping the first", z.id);
            }
            fresh
        })
        .collect()
}

/// Builder for [`ZoneStore`].
#[derive(Default)]
pub struct ZoneStoreBuilder {
    cache: Option<Arc<dyn ZoneCache>>,
    remote: Option<Arc<dyn ZoneSource>>,
    bundled: Option<Arc<dyn ZoneSource>>,
    cache_key: Option<String>,
    default_radius_km: Option<f64>,
}

impl ZoneStoreBuilder {
    /// Sets the cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ZoneCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the remote source.
    #[must_use]
    pub fn remote(mut self, source: Arc<dyn ZoneSource>) -> Self {
        self.remote = Some(source);
        self
    }

    /// Sets the bundled fallback source.
    #[must_use]
    pub fn bundled(mut self, source: Arc<dyn ZoneSource>) -> Self {
        self.bundled = Some(source);
        self
    }

    /// Sets the cache key (default `geofences:v1`).
    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Sets the radius for circle records without a usable radius.
    #[must_use]
    pub fn default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = Some(radius_km);
        self
    }

    /// Builds an empty store.
    #[must_use]
    pub fn build(self) -> ZoneStore {
        ZoneStore {
            current: RwLock::new(Arc::new(ZoneSnapshot::empty())),
            generation: AtomicU64::new(0),
            cache: self.cache,
            remote: self.remote,
            bundled: self.bundled,
            cache_key: self.cache_key.unwrap_or_else(|| DEFAULT_CACHE_KEY.to_string()),
            default_radius_km: self.default_radius_km.unwrap_or(DEFAULT_CIRCLE_RADIUS_KM),
        }
    }
}

/// Holder of the current zone snapshot and the sources that feed it.
pub struct ZoneStore {
    current: RwLock<Arc<ZoneSnapshot>>,
    generation: AtomicU64,
    cache: Option<Arc<dyn ZoneCache>>,
    remote: Option<Arc<dyn ZoneSource>>,
    bundled: Option<Arc<dyn ZoneSource>>,
    cache_key: String,
    default_radius_km: f64,
}

impl fmt::Debug for ZoneStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ZoneStore")
            .field("zones", &snapshot.len())
            .field("generation", &snapshot.generation())
            .field("origin", &snapshot.origin())
            .field("cache", &self.cache.is_some())
            .field("remote", &self.remote.as_ref().map(|s| s.name().to_string()))
            .field("bundled", &self.bundled.as_ref().map(|s| s.name().to_string()))
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ZoneStore {
    /// Starts building a store.
    #[must_use]
    pub fn builder() -> ZoneStoreBuilder {
        ZoneStoreBuilder::default()
    }

    /// Creates a store holding `zones` and no sources.
    #[must_use]
    pub fn with_zones(zones: Vec<Zone>) -> Self {
        let store = Self::default();
        store.replace(zones);
        store
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Cache key in use.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Returns true if a remote source is configured.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Installs `zones` unless they match the current snapshot.
    ///
    /// Returns true if a new snapshot was installed.
    fn install(&self, zones: Vec<Arc<Zone>>, origin: ZoneOrigin) -> bool {
        let zones = dedup_ids(zones, origin);
        let fp = fingerprint(&zones);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.fingerprint == fp && current.origin != ZoneOrigin::Empty {
            log::debug!("zone store: {origin} zones unchanged (generation {})", current.generation);
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = ZoneSnapshot::build(zones, generation, origin, fp);
        log::info!("zone store: installed {} zones from {origin} (generation {generation})", snapshot.len());
        *current = Arc::new(snapshot);
        true
    }

    /// Replaces the zone set with host-supplied zones.
    ///
    /// Geometry invariants are re-established and duplicate ids dropped
    /// (first wins). Returns true if the set changed.
    pub fn replace(&self, zones: Vec<Zone>) -> bool {
        let zones = zones
            .into_iter()
            .map(|z| Arc::new(z.normalized(self.default_radius_km)))
            .collect();
        self.install(zones, ZoneOrigin::Manual)
    }

    fn read_cache(&self) -> Option<Vec<Zone>> {
        let cache = self.cache.as_ref()?;
        match cache.read(&self.cache_key) {
            Ok(Some(zones)) if !zones.is_empty() => Some(zones),
            Ok(_) => None,
            Err(e) => {
                log::warn!("zone store: cache read failed for '{}': {e}", self.cache_key);
                None
            }
        }
    }

    fn write_cache(&self, zones: &[Arc<Zone>]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let owned: Vec<Zone> = zones.iter().map(|z| z.as_ref().clone()).collect();
        if let Err(e) = cache.write(&self.cache_key, &owned) {
            log::warn!("zone store: cache write failed for '{}': {e}", self.cache_key);
        }
    }

    fn fetch(&self, source: &dyn ZoneSource, near: Option<LatLng>) -> Result<Vec<Arc<Zone>>, SourceError> {
        let records = source.fetch(near)?;
        Ok(records_to_zones(source.name(), records, self.default_radius_km)
            .into_iter()
            .map(Arc::new)
            .collect())
    }

    /// Loads zones through the fallback chain and returns where they came from.
    ///
    /// Never fails: when every source misses, an empty set is installed.
    pub fn load(&self, near: Option<LatLng>) -> ZoneOrigin {
        if let Some(zones) = self.read_cache() {
            let zones = zones
                .into_iter()
                .map(|z| Arc::new(z.normalized(self.default_radius_km)))
                .collect();
            self.install(zones, ZoneOrigin::Cache);
            return ZoneOrigin::Cache;
        }

        let chain = [
            (self.remote.as_deref(), ZoneOrigin::Remote),
            (self.bundled.as_deref(), ZoneOrigin::Bundled),
        ];
        for (source, origin) in chain {
            let Some(source) = source else {
                continue;
            };
            match self.fetch(source, near) {
                Ok(zones) if !zones.is_empty() => {
                    self.write_cache(&zones);
                    self.install(zones, origin);
                    return origin;
                }
                Ok(_) => log::info!("zone store: {} returned no zones", source.name()),
                Err(e) => log::warn!("zone store: {} load failed, falling back: {e}", source.name()),
            }
        }

        log::warn!("zone store: no zone source produced zones, continuing with an empty set");
        self.install(Vec::new(), ZoneOrigin::Empty);
        ZoneOrigin::Empty
    }

    /// Re-fetches from the remote source.
    ///
    /// On success with a non-empty result the zones are cached and swapped in;
    /// returns whether the snapshot changed. An empty result keeps the
    /// current snapshot.
    ///
    /// # Errors
    ///
    /// Returns the source error; the current snapshot stays in place.
    pub fn refresh(&self, near: Option<LatLng>) -> ZoneResult<bool> {
        let Some(remote) = self.remote.as_deref() else {
            return Ok(false);
        };
        let zones = self.fetch(remote, near)?;
        if zones.is_empty() {
            log::debug!("zone store: refresh from {} returned no zones", remote.name());
            return Ok(false);
        }
        self.write_cache(&zones);
        Ok(self.install(zones, ZoneOrigin::Remote))
    }

    /// Runs [`ZoneStore::refresh`] on a named background thread.
    ///
    /// Failures are logged at debug level. The handle yields whether the
    /// snapshot changed.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn_refresh(self: &Arc<Self>, near: Option<LatLng>) -> std::io::Result<JoinHandle<bool>> {
        let store = Arc::clone(self);
        thread::Builder::new()
            .name(REFRESH_THREAD_NAME.to_string())
            .spawn(move || match store.refresh(near) {
                Ok(changed) => changed,
                Err(e) => {
                    log::debug!("zone store: background refresh failed: {e}");
                    false
                }
            })
    }

    /// Deletes the cached zone list.
    ///
    /// # Errors
    ///
    /// Returns the cache backend error.
    pub fn clear_cache(&self) -> ZoneResult<()> {
        if let Some(cache) = self.cache.as_ref() {
            cache.delete(&self.cache_key)?;
        }
        Ok(())
    }

    /// Zones within `radius_km` of `point` (default 15 km), nearest first.
    #[must_use]
    pub fn filter_by_distance(&self, point: LatLng, radius_km: Option<f64>) -> Vec<Arc<Zone>> {
        self.zones_near(point, radius_km)
            .into_iter()
            .map(|(zone, _)| zone)
            .collect()
    }

    /// Like [`ZoneStore::filter_by_distance`], with distances in km.
    #[must_use]
    pub fn zones_near(&self, point: LatLng, radius_km: Option<f64>) -> Vec<(Arc<Zone>, f64)> {
        self.snapshot()
            .zones_near(point, radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZoneError;
    use crate::source::{BundledZones, FnZoneSource};
    use crate::storage::InMemoryZoneCache;

    fn zones() -> Vec<Zone> {
        vec![
            Zone::circle("a", "A", LatLng::new(10.0, 10.0), 1.0),
            Zone::point("b", "B", LatLng::new(10.05, 10.0)),
            Zone::point("far", "Far", LatLng::new(40.0, 40.0)),
        ]
    }

    #[test]
    fn test_replace_installs_and_skips_unchanged() {
        let store = ZoneStore::default();
        assert_eq!(store.snapshot().generation(), 0);
        assert!(store.replace(zones()));
        let first = store.snapshot();
        assert_eq!(first.len(), 3);
        assert_eq!(first.origin(), ZoneOrigin::Manual);

        assert!(!store.replace(zones()));
        assert_eq!(store.snapshot().generation(), first.generation());
    }

    #[test]
    fn test_replace_drops_duplicate_ids() {
        let mut list = zones();
        list.push(Zone::point("a", "Second A", LatLng::new(0.0, 0.0)));
        let store = ZoneStore::with_zones(list);
        let snap = store.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.get(&ZoneId::from("a")).unwrap().name, "A");
    }

    #[test]
    fn test_cache_load_drops_duplicate_ids() {
        let dup = Zone::circle("dup", "First", LatLng::new(10.0, 10.0), 1.0);
        let mut second = dup.clone();
        second.name = "Second".to_string();
        let cache = Arc::new(InMemoryZoneCache::with_entry(DEFAULT_CACHE_KEY, vec![dup, second]));
        let store = ZoneStore::builder().cache(cache).build();

        assert_eq!(store.load(None), ZoneOrigin::Cache);
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.zones()[0].name, "First");
    }

    #[test]
    fn test_old_snapshot_survives_swap() {
        let store = ZoneStore::with_zones(zones());
        let held = store.snapshot();
        store.replace(vec![]);
        assert_eq!(held.len(), 3);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_zones_near_sorted_and_bounded() {
        let store = ZoneStore::with_zones(zones());
        let near = store.zones_near(LatLng::new(10.06, 10.0), None);
        let ids: Vec<&str> = near.iter().map(|(z, _)| z.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(near[0].1 < near[1].1);

        let within = store.filter_by_distance(LatLng::new(10.0, 10.0), Some(1.0));
        assert_eq!(within.len(), 1);
        assert!(store.zones_near(LatLng::new(f64::NAN, 0.0), None).is_empty());
    }

    #[test]
    fn test_load_prefers_cache_then_remote_then_bundled() {
        let cache = Arc::new(InMemoryZoneCache::new());
        let bundled = BundledZones::from_json_str(r#"[{"id": "x", "type": "point", "coords": [1, 2]}]"#).unwrap();
        let store = ZoneStore::builder()
            .cache(cache.clone())
            .bundled(Arc::new(bundled))
            .build();

        assert_eq!(store.load(None), ZoneOrigin::Bundled);
        assert_eq!(cache.read(DEFAULT_CACHE_KEY).unwrap().unwrap().len(), 1);
        assert_eq!(store.load(None), ZoneOrigin::Cache);
    }

    #[test]
    fn test_load_everything_failing_is_empty() {
        let remote = FnZoneSource::new("remote", |_| {
            Err(SourceError::Unavailable {
                source_name: "remote".to_string(),
                message: "offline".to_string(),
            })
        });
        let store = ZoneStore::builder().remote(Arc::new(remote)).build();
        assert_eq!(store.load(None), ZoneOrigin::Empty);
        assert!(store.snapshot().is_empty());
        assert_eq!(store.snapshot().origin(), ZoneOrigin::Empty);
    }

    #[test]
    fn test_refresh_failure_keeps_snapshot() {
        let remote = FnZoneSource::new("remote", |_| {
            Err(SourceError::Unavailable {
                source_name: "remote".to_string(),
                message: "offline".to_string(),
            })
        });
        let store = ZoneStore::builder().remote(Arc::new(remote)).build();
        store.replace(zones());
        let err = store.refresh(None).unwrap_err();
        assert!(matches!(err, ZoneError::Source(_)));
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn test_spawn_refresh_swaps_in_remote_zones() {
        let remote = FnZoneSource::new("remote", |_| {
            BundledZones::from_json_str(r#"[{"id": "r", "type": "circle", "coords": [5, 5], "radius_km": 2}]"#)
                .and_then(|b| b.fetch(None))
        });
        let store = Arc::new(ZoneStore::builder().remote(Arc::new(remote)).build());
        let handle = store.spawn_refresh(None).unwrap();
        assert!(handle.join().unwrap());
        let snap = store.snapshot();
        assert_eq!(snap.origin(), ZoneOrigin::Remote);
        assert!(snap.contains(&ZoneId::from("r")));

        // Same content again: no new generation.
        assert!(!store.refresh(None).unwrap());
    }
}
