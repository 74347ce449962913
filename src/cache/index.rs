//! JSON index of cached models (`models.json`).
//!
//! The index is a plain array of records, rewritten in full on every change.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArkError, Result};

/// File name of the index inside the cache directory.
pub const INDEX_FILE: &str = "models.json";

/// One cached model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    /// Source URL the model was downloaded from.
    pub url: String,
    pub cache_key: String,
    /// Where the cached model file lives.
    pub cached_archive_path: PathBuf,
    /// Unix milliseconds when the record was written.
    pub timestamp: i64,
}

impl ModelRecord {
    pub fn new(url: &str, cache_key: &str, cached_archive_path: PathBuf) -> Self {
        Self {
            url: url.to_string(),
            cache_key: cache_key.to_string(),
            cached_archive_path,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Reader/writer for the record list.
#[derive(Debug, Clone)]
pub struct ModelIndex {
    path: PathBuf,
}

impl ModelIndex {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(INDEX_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in insertion order. A missing index is empty.
    pub fn read(&self) -> Result<Vec<ModelRecord>> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                ArkError::Cache(format!(
                    "Model index {} is corrupt: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ArkError::Io(e)),
        }
    }

    pub fn write(&self, records: &[ModelRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    /// Append `record`, dropping any earlier record with the same key.
    pub fn append(&self, record: ModelRecord) -> Result<()> {
        let mut records = self.read()?;
        records.retain(|r| r.cache_key != record.cache_key);
        debug!(key = %record.cache_key, "Appending model record");
        records.push(record);
        self.write(&records)
    }

    /// Remove the record for `cache_key`. Returns the removed record, if any.
    pub fn remove(&self, cache_key: &str) -> Result<Option<ModelRecord>> {
        let mut records = self.read()?;
        let Some(pos) = records.iter().position(|r| r.cache_key == cache_key) else {
            return Ok(None);
        };
        let removed = records.remove(pos);
        self.write(&records)?;
        Ok(Some(removed))
    }
}
