//! Zone cache backends.
//!
//! The [`ZoneCache`] trait is the only thing the store depends on. The
//! in-memory backend is always available; the file-backed one requires the
//! `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryZoneCache;
pub use traits::{CacheEnvelope, StorageError, ZoneCache, CACHE_ENVELOPE_VERSION};

#[cfg(feature = "persistent")]
pub use persistent::{FileCacheConfig, FileZoneCache};
