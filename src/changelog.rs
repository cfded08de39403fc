// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change log.
//!
//! An append-only, size-bounded ledger of diff outputs shared by every
//! dataset. Entries are kept most-recent-first; once the cap is reached the
//! oldest entries (by timestamp) are evicted. Appends dedup on
//! `(timestamp, identity_key, action)` so re-processing one sync cycle can
//! never double-log it, and each append is durably on disk before the call
//! returns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::diff::{ChangeAction, ChangeRecord};
use crate::error::StorageError;
use crate::record::DatasetName;
use crate::snapshot::atomic_write;

/// Reference retention bound: most recent 5000 entries.
pub const DEFAULT_CHANGELOG_CAP: usize = 5000;

/// Filters for [`ChangeLog::query`]. All fields are conjunctive; `None`
/// means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub dataset: Option<DatasetName>,
    pub action: Option<ChangeAction>,
    /// Case-insensitive substring match across all fields.
    pub contains: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Per-day action counts for trend charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// CSV-backed bounded change ledger.
pub struct ChangeLog {
    path: PathBuf,
    cap: usize,
    // Appends from different datasets may run in parallel; the ledger's
    // read-modify-write cycle must not interleave.
    write_lock: Mutex<()>,
}

impl ChangeLog {
    pub fn open(path: impl AsRef<Path>, cap: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        Ok(Self {
            path,
            cap,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a batch of change records.
    ///
    /// Returns the number of entries actually added after dedup. The ledger
    /// file is rewritten atomically and fsynced before this returns.
    pub fn append(&self, records: &[ChangeRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock();

        let existing = self.load_all()?;
        let seen: HashSet<(DateTime<Utc>, &str, ChangeAction)> = existing
            .iter()
            .map(|r| (r.timestamp, r.identity_key.as_str(), r.action))
            .collect();

        let fresh: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| !seen.contains(&(r.timestamp, r.identity_key.as_str(), r.action)))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        let added = fresh.len();

        let mut merged: Vec<ChangeRecord> = fresh.into_iter().cloned().collect();
        merged.extend(existing);
        // Most-recent-first; identity key breaks ties so equal inputs
        // serialize identically.
        merged.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
                .then_with(|| a.action.as_str().cmp(b.action.as_str()))
        });
        merged.truncate(self.cap);

        let mut wtr = csv::Writer::from_writer(Vec::new());
        for record in &merged {
            wtr.serialize(record)
                .map_err(|e| StorageError::codec(&self.path, e))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| StorageError::codec(&self.path, e))?;
        atomic_write(&self.path, &bytes)?;

        crate::metrics::set_changelog_entries(merged.len());
        debug!(added, retained = merged.len(), "change log appended");
        Ok(added)
    }

    /// Every retained entry, most-recent-first. Missing file is empty.
    pub fn load_all(&self) -> Result<Vec<ChangeRecord>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr =
            csv::Reader::from_path(&self.path).map_err(|e| StorageError::codec(&self.path, e))?;
        let mut out = Vec::new();
        for row in rdr.deserialize() {
            out.push(row.map_err(|e| StorageError::codec(&self.path, e))?);
        }
        Ok(out)
    }

    /// Filtered query, most-recent-first, capped at `limit`.
    pub fn query(
        &self,
        filter: &ChangeFilter,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, StorageError> {
        let needle = filter.contains.as_ref().map(|s| s.to_lowercase());
        let out = self
            .load_all()?
            .into_iter()
            .filter(|r| {
                if let Some(ds) = &filter.dataset {
                    if r.dataset_group != ds.group || r.dataset_feature != ds.feature {
                        return false;
                    }
                }
                if let Some(action) = filter.action {
                    if r.action != action {
                        return false;
                    }
                }
                if let Some(from) = filter.from {
                    if r.timestamp < from {
                        return false;
                    }
                }
                if let Some(until) = filter.until {
                    if r.timestamp > until {
                        return false;
                    }
                }
                if let Some(needle) = &needle {
                    if !r.matches(needle) {
                        return false;
                    }
                }
                true
            })
            .take(limit)
            .collect();
        Ok(out)
    }

    /// Per-day action counts for the trailing `days` window ending at
    /// `end` (inclusive). Always exactly `days` entries, one per calendar
    /// day, missing days zero-filled.
    pub fn trend(
        &self,
        dataset: Option<&DatasetName>,
        days: u32,
        end: NaiveDate,
    ) -> Result<Vec<DailyTrend>, StorageError> {
        let records = self.load_all()?;
        Ok(trend_over(&records, dataset, days, end))
    }

    /// Number of retained entries whose timestamp falls on `date` (UTC).
    pub fn count_on(&self, date: NaiveDate) -> Result<usize, StorageError> {
        Ok(self
            .load_all()?
            .iter()
            .filter(|r| r.timestamp.date_naive() == date)
            .count())
    }
}

fn trend_over(
    records: &[ChangeRecord],
    dataset: Option<&DatasetName>,
    days: u32,
    end: NaiveDate,
) -> Vec<DailyTrend> {
    let days = days.max(1);
    let start = end - Duration::days(i64::from(days) - 1);
    let mut series: Vec<DailyTrend> = (0..days)
        .map(|i| DailyTrend {
            date: start + Duration::days(i64::from(i)),
            created: 0,
            updated: 0,
            removed: 0,
        })
        .collect();

    for record in records {
        if let Some(ds) = dataset {
            if record.dataset_group != ds.group || record.dataset_feature != ds.feature {
                continue;
            }
        }
        let date = record.timestamp.date_naive();
        if date < start || date > end {
            continue;
        }
        let idx = (date - start).num_days() as usize;
        match record.action {
            ChangeAction::Created => series[idx].created += 1,
            ChangeAction::Updated => series[idx].updated += 1,
            ChangeAction::Removed => series[idx].removed += 1,
        }
    }
    series
}
