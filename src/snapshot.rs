// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot store.
//!
//! Persists each dataset as a columnar CSV snapshot under one cache root,
//! with an optional daily history and a small JSON metadata sidecar per
//! dataset. Every write goes through a temp-file-then-rename replace, so a
//! crash mid-write never leaves a reader a partial file: `read` returns
//! either the old snapshot or the new one.
//!
//! Layout under the root:
//!
//! ```text
//! records__<group>__<feature>.csv          current snapshot
//! records__<group>__<feature>._meta.json   last sync timestamp + counts
//! daily/records__<group>__<feature>/<YYYY-MM-DD>.csv
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diff::SyncCounts;
use crate::error::StorageError;
use crate::record::{DatasetName, FeatureRecord};

const SNAPSHOT_SUFFIX: &str = ".csv";
const META_SUFFIX: &str = "._meta.json";
const DAILY_DIR: &str = "daily";

/// Per-dataset sync metadata, written only by the orchestrator after a
/// successful fetch+diff+persist cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_sync: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: SyncCounts,
}

/// File-backed snapshot store rooted at one cache directory.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(DAILY_DIR)).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, dataset: &DatasetName) -> PathBuf {
        self.root
            .join(format!("{}{}", dataset.cache_name(), SNAPSHOT_SUFFIX))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{META_SUFFIX}"))
    }

    fn daily_path(&self, dataset: &DatasetName, date: NaiveDate) -> PathBuf {
        self.root
            .join(DAILY_DIR)
            .join(dataset.cache_name())
            .join(format!("{date}{SNAPSHOT_SUFFIX}"))
    }

    /// Replace the current snapshot for `dataset` atomically.
    pub fn write(
        &self,
        dataset: &DatasetName,
        records: &[FeatureRecord],
    ) -> Result<(), StorageError> {
        let path = self.snapshot_path(dataset);
        let bytes = encode_csv(records, &path)?;
        atomic_write(&path, &bytes)?;
        debug!(dataset = %dataset, rows = records.len(), "snapshot written");
        Ok(())
    }

    /// The current snapshot, or empty if the dataset was never synced.
    pub fn read(&self, dataset: &DatasetName) -> Result<Vec<FeatureRecord>, StorageError> {
        let path = self.snapshot_path(dataset);
        if !path.exists() {
            return Ok(Vec::new());
        }
        decode_csv(&path)
    }

    /// Copy the current snapshot into the daily history, once per calendar
    /// date. Returns whether a copy was made.
    pub fn retain_daily(
        &self,
        dataset: &DatasetName,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        let current = self.snapshot_path(dataset);
        if !current.exists() {
            return Ok(false);
        }
        let daily = self.daily_path(dataset, date);
        if daily.exists() {
            return Ok(false);
        }
        if let Some(parent) = daily.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let bytes = fs::read(&current).map_err(|e| StorageError::io(&current, e))?;
        atomic_write(&daily, &bytes)?;
        debug!(dataset = %dataset, %date, "daily snapshot retained");
        Ok(true)
    }

    /// A historical daily snapshot, if one was retained for that date.
    pub fn read_as_of(
        &self,
        dataset: &DatasetName,
        date: NaiveDate,
    ) -> Result<Option<Vec<FeatureRecord>>, StorageError> {
        let path = self.daily_path(dataset, date);
        if !path.exists() {
            return Ok(None);
        }
        decode_csv(&path).map(Some)
    }

    /// Write the metadata sidecar for `name` (a cache name, or `index` for
    /// the whole-pass summary).
    pub fn write_metadata(&self, name: &str, meta: &SyncMetadata) -> Result<(), StorageError> {
        let path = self.meta_path(name);
        let bytes =
            serde_json::to_vec_pretty(meta).map_err(|e| StorageError::codec(&path, e))?;
        atomic_write(&path, &bytes)
    }

    /// Read the metadata sidecar. Missing or unreadable metadata is `None`,
    /// never an error — a dataset without metadata is simply never-synced.
    pub fn read_metadata(&self, name: &str) -> Result<Option<SyncMetadata>, StorageError> {
        let path = self.meta_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| StorageError::io(&path, e))?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable sync metadata, treating as never synced");
                Ok(None)
            }
        }
    }
}

fn encode_csv(records: &[FeatureRecord], path: &Path) -> Result<Vec<u8>, StorageError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for record in records {
        wtr.serialize(record)
            .map_err(|e| StorageError::codec(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| StorageError::codec(path, e))
}

fn decode_csv(path: &Path) -> Result<Vec<FeatureRecord>, StorageError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| StorageError::codec(path, e))?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        out.push(row.map_err(|e| StorageError::codec(path, e))?);
    }
    Ok(out)
}

/// Write `bytes` to `path` all-or-nothing: temp file in the same directory,
/// fsync, then rename over the target.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::io(path, std::io::Error::other("path has no parent")))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}
