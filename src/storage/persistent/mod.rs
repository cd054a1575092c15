//! File-backed zone cache.
//!
//! One file per cache key inside a directory, each holding a versioned
//! [`CacheEnvelope`](crate::storage::CacheEnvelope) in a CRC32-checked frame.
//! Files are replaced by write-to-temp, fsync, rename, so a crash during a
//! write leaves the previous list intact.

mod codec;
mod file_cache;

pub use file_cache::FileZoneCache;

/// Configuration for [`FileZoneCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCacheConfig {
    /// Whether to fsync each file before the rename (slower but safer).
    pub sync_on_write: bool,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}
