//! Local model cache keyed by source URL.
//!
//! A cache key is the SHA-256 of the source URL plus the URL's file
//! extension. An entry is fresh while its file is younger than the TTL
//! (30 days by default); freshness is checked on lookup only, nothing is
//! swept in the background. A `models.json` index records what was cached.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{ArkError, Result};

use super::index::{ModelIndex, ModelRecord};

/// Summary of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Records in the index.
    pub entries: usize,
    /// Records whose file is missing or past the TTL.
    pub expired: usize,
    /// Total size of cached files on disk.
    pub total_bytes: u64,
}

/// File cache for downloaded models.
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
    ttl: Duration,
    default_extension: String,
    index: ModelIndex,
}

impl ModelCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn new(dir: PathBuf, ttl: Duration, default_extension: &str) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ArkError::Cache(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let index = ModelIndex::new(&dir);
        Ok(Self {
            dir,
            ttl,
            default_extension: default_extension.to_string(),
            index,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.resolve_dir(), config.ttl(), &config.default_extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic key for `url`: hex SHA-256 of the URL plus its path extension.
    ///
    /// URLs without an extension (or that fail to parse) get `default_extension`.
    pub fn cache_key(url: &str, default_extension: &str) -> String {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        let extension = url_extension(url).unwrap_or_else(|| default_extension.to_string());
        format!("{}{}", digest, extension)
    }

    /// [`ModelCache::cache_key`] with this cache's default extension.
    pub fn key_for(&self, url: &str) -> String {
        Self::cache_key(url, &self.default_extension)
    }

    /// Path of a fresh cached file for `key`, or `None` on miss or expiry.
    pub fn lookup(&self, key: &str) -> Result<Option<PathBuf>> {
        self.lookup_at(key, SystemTime::now())
    }

    pub(crate) fn lookup_at(&self, key: &str, now: SystemTime) -> Result<Option<PathBuf>> {
        validate_key(key)?;
        let path = self.dir.join(key);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArkError::Io(e)),
        };

        if self.is_fresh(&metadata, now) {
            info!(path = %path.display(), "Cache hit");
            Ok(Some(path))
        } else {
            info!(key, "Cached model expired, will download again");
            Ok(None)
        }
    }

    /// Copy `source` into the cache under `key` and record it in the index.
    ///
    /// Any previous file for the key is removed first so that the new
    /// copy's creation time starts the TTL afresh.
    pub fn store(&self, url: &str, key: &str, source: &Path) -> Result<PathBuf> {
        validate_key(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.dir.join(key);
        match std::fs::remove_file(&dest) {
            Ok(()) => debug!(key, "Replaced previous cached file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArkError::Io(e)),
        }
        std::fs::copy(source, &dest).map_err(|e| {
            ArkError::Cache(format!(
                "Failed to copy '{}' into cache as '{}': {}",
                source.display(),
                dest.display(),
                e
            ))
        })?;
        // A file without an index record would be served as a hit but never listed.
        if let Err(e) = self.index.append(ModelRecord::new(url, key, dest.clone())) {
            if let Err(rm) = std::fs::remove_file(&dest) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove unrecorded cache file {}: {}", dest.display(), rm);
                }
            }
            return Err(e);
        }
        info!(path = %dest.display(), "Model cached");
        Ok(dest)
    }

    /// All index records, oldest first.
    pub fn records(&self) -> Result<Vec<ModelRecord>> {
        self.index.read()
    }

    /// Delete the cached file and index record for `key`.
    ///
    /// Returns `true` when either existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let file_removed = match std::fs::remove_file(self.dir.join(key)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(ArkError::Io(e)),
        };
        let record_removed = self.index.remove(key)?.is_some();
        Ok(file_removed || record_removed)
    }

    /// Delete everything in the cache, index included.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ArkError::Cache(format!(
                    "Failed to clear cache {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        }
        std::fs::create_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "Model cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let now = SystemTime::now();
        let mut stats = CacheStats::default();
        for record in self.records()? {
            stats.entries += 1;
            match std::fs::metadata(self.dir.join(&record.cache_key)) {
                Ok(m) => {
                    stats.total_bytes += m.len();
                    if !self.is_fresh(&m, now) {
                        stats.expired += 1;
                    }
                }
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(key = %record.cache_key, "Failed to stat cached file: {}", e);
                    }
                    stats.expired += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Is the file younger than the TTL at `now`?
    pub(crate) fn is_fresh(&self, metadata: &std::fs::Metadata, now: SystemTime) -> bool {
        let Some(born) = file_birth_time(metadata) else {
            return false;
        };
        let age = now.duration_since(born).unwrap_or(Duration::ZERO);
        age < self.ttl
    }
}

/// Creation time, falling back to modification time where unsupported.
fn file_birth_time(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    metadata.created().or_else(|_| metadata.modified()).ok()
}

/// `.ext` of the last path segment of `url`, if any.
fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    // A leading dot names a hidden file, not an extension; a trailing dot
    // yields the bare "." extension.
    match last.rfind('.') {
        Some(idx) if idx > 0 => Some(last[idx..].to_string()),
        _ => None,
    }
}

/// Keys are plain file names inside the cache directory.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(ArkError::Cache(format!("Invalid cache key '{}'", key)));
    }
    Ok(())
}
