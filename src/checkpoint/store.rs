//! File-backed checkpoint store
//!
//! One small JSON file per store under a checkpoint directory:
//!
//! ```text
//! {checkpoint_dir}/
//! ├── store-101.json   # {"storeId":"store-101","index":3,"updatedAt":"..."}
//! └── store-102.json
//! ```
//!
//! A bare integer file is also accepted on read.

use crate::checkpoint::CheckpointError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Progress of one store worker through the basis list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub store_id: String,

    /// Index of the next category to process
    #[serde(rename = "index")]
    pub category_index: usize,
    pub updated_at: DateTime<Utc>,
}

/// Directory of per-store checkpoint files
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a store's checkpoint file
    pub fn path(&self, store_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", store_id))
    }

    /// Reads a store's checkpoint, `None` if it was never written
    pub fn read(&self, store_id: &str) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let path = self.path(store_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Io(e)),
        };

        let trimmed = content.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            let updated_at = std::fs::metadata(&path)?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            return Ok(Some(CheckpointRecord {
                store_id: store_id.to_string(),
                category_index: index,
                updated_at,
            }));
        }

        let record: CheckpointRecord =
            serde_json::from_str(trimmed).map_err(|e| CheckpointError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if record.store_id != store_id {
            return Err(CheckpointError::Corrupt {
                path: path.display().to_string(),
                reason: format!("belongs to store '{}'", record.store_id),
            });
        }

        Ok(Some(record))
    }

    /// Records `index` as the next category for a store
    ///
    /// The file is replaced atomically (write to temp, then rename).
    pub fn write(&self, store_id: &str, index: usize) -> Result<CheckpointRecord, CheckpointError> {
        std::fs::create_dir_all(&self.dir)?;

        let record = CheckpointRecord {
            store_id: store_id.to_string(),
            category_index: index,
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| CheckpointError::Corrupt {
            path: self.path(store_id).display().to_string(),
            reason: e.to_string(),
        })?;

        let path = self.path(store_id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;

        tracing::trace!("Checkpoint for {} set to {}", store_id, index);
        Ok(record)
    }

    /// Deletes a store's checkpoint; returns false if there was none
    pub fn reset(&self, store_id: &str) -> Result<bool, CheckpointError> {
        match std::fs::remove_file(self.path(store_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CheckpointError::Io(e)),
        }
    }
}
