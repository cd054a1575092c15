use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use super::codec;
use super::FileCacheConfig;
use crate::storage::traits::{CacheEnvelope, StorageError, ZoneCache};
use crate::zone::Zone;

const FILE_EXTENSION: &str = "zwc";

/// [`ZoneCache`] storing one file per key in a directory.
///
/// Writes go to a uniquely named temporary file that is flushed, synced and
/// renamed over the target, so readers only ever see a complete file.
#[derive(Debug)]
pub struct FileZoneCache {
    dir: PathBuf,
    config: FileCacheConfig,
    // Serializes writers within this process; rename keeps readers safe.
    write_lock: Mutex<()>,
}

impl FileZoneCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, config: FileCacheConfig) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path used for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for empty keys.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let file_name = file_name_for(key)?;
        Ok(self.dir.join(file_name))
    }

    fn corrupted(key: &str, reason: impl Into<String>) -> StorageError {
        StorageError::Corrupted {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Maps a cache key onto a portable file name.
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept; everything else (including
/// the `:` in `geofences:v1`) is hex-escaped as `%XX`.
fn file_name_for(key: &str) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    let mut name = String::with_capacity(key.len() + 4);
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name.push('.');
    name.push_str(FILE_EXTENSION);
    Ok(name)
}

impl ZoneCache for FileZoneCache {
    fn read(&self, key: &str) -> Result<Option<Vec<Zone>>, StorageError> {
        let path = self.path_for(key)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let version = codec::read_header(&mut reader).map_err(|e| Self::corrupted(key, e.to_string()))?;
        if version != codec::CODEC_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: u32::from(version),
                expected: u32::from(codec::CODEC_VERSION),
            });
        }
        let envelope: CacheEnvelope = codec::decode(&mut reader).map_err(|e| Self::corrupted(key, e.to_string()))?;
        let zones = envelope.into_zones()?;
        log::debug!("file cache: read {} zones from {}", zones.len(), path.display());
        Ok(Some(zones))
    }

    fn write(&self, key: &str, zones: &[Zone]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let envelope = CacheEnvelope::new(zones.to_vec());
        let frame = codec::encode(&envelope).map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::BackendError("poisoned lock: file_cache.write".to_string()))?;

        let temp_path = path.with_extension(format!("{FILE_EXTENSION}.tmp.{}", Uuid::new_v4()));
        let result = (|| -> Result<(), StorageError> {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            writer.write_all(&frame)?;
            writer.flush()?;
            if self.config.sync_on_write {
                writer.get_ref().sync_all()?;
            }
            fs::rename(&temp_path, &path)?;
            Ok(())
        })();

        if result.is_err() {
            if let Err(e) = fs::remove_file(&temp_path) {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("file cache: could not remove {}: {e}", temp_path.display());
                }
            }
        }
        result
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
