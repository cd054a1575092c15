//! Cache trait for the last-known zone list.
//!
//! The store treats every cache failure as non-fatal: a failed read falls
//! through to the next zone source, a failed write is logged. Implementations
//! still report errors precisely so hosts can observe them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zone::Zone;

/// Envelope version written by the current code.
pub const CACHE_ENVELOPE_VERSION: u32 = 1;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Stored bytes failed integrity checks.
    #[error("Corrupted cache entry '{key}': {reason}")]
    Corrupted {
        /// Cache key.
        key: String,
        /// What failed.
        reason: String,
    },

    /// Envelope written by an incompatible version.
    #[error("Unsupported cache envelope version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found on disk.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Key cannot be used by this backend.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Versioned wrapper persisted around a zone list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// Cached zones.
    pub zones: Vec<Zone>,
}

impl CacheEnvelope {
    /// Wraps `zones` at the current version.
    #[must_use]
    pub fn new(zones: Vec<Zone>) -> Self {
        Self {
            version: CACHE_ENVELOPE_VERSION,
            zones,
        }
    }

    /// Unwraps the zones, rejecting other versions.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedVersion`] for a foreign version.
    pub fn into_zones(self) -> Result<Vec<Zone>, StorageError> {
        if self.version != CACHE_ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: self.version,
                expected: CACHE_ENVELOPE_VERSION,
            });
        }
        Ok(self.zones)
    }
}

/// Durable key/value store for zone lists.
///
/// Implementations must be safe to call from the refresh thread and the
/// caller thread concurrently.
pub trait ZoneCache: Send + Sync {
    /// Reads the zone list stored under `key`; `Ok(None)` when absent.
    fn read(&self, key: &str) -> Result<Option<Vec<Zone>>, StorageError>;

    /// Replaces the zone list stored under `key`.
    fn write(&self, key: &str, zones: &[Zone]) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}
