//! In-memory cache backend.
//!
//! Thread-safe, process-local. Intended for embedded usage, tests, and hosts
//! that provide their own durability.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::storage::traits::{StorageError, ZoneCache};
use crate::zone::Zone;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// [`ZoneCache`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryZoneCache {
    entries: RwLock<HashMap<String, Vec<Zone>>>,
}

impl InMemoryZoneCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding `zones` under `key`.
    #[must_use]
    pub fn with_entry(key: impl Into<String>, zones: Vec<Zone>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), zones);
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ZoneCache for InMemoryZoneCache {
    fn read(&self, key: &str) -> Result<Option<Vec<Zone>>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("zone_cache.read"))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, zones: &[Zone]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("zone_cache.write"))?;
        entries.insert(key.to_string(), zones.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("zone_cache.delete"))?;
        entries.remove(key);
        Ok(())
    }
}
