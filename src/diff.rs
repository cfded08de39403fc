// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Diff engine.
//!
//! Compares two snapshots of the same dataset keyed by identity key and
//! classifies every record as created, updated, removed or unchanged. Pure:
//! no side effects, deterministic output order (sorted by identity key, which
//! is the fixed-order dimension join).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::KeySpec;
use crate::record::{DatasetName, FeatureRecord};

/// Classification of one detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Removed,
}

impl ChangeAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeAction::Created),
            "updated" => Ok(ChangeAction::Updated),
            "removed" => Ok(ChangeAction::Removed),
            other => Err(format!("unknown change action '{other}'")),
        }
    }
}

/// A record tagged with its identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRecord {
    pub key: String,
    pub record: FeatureRecord,
}

/// Before/after pair for an updated entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedRecord {
    pub key: String,
    pub before: FeatureRecord,
    pub after: FeatureRecord,
}

/// Counts returned by one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl SyncCounts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

impl std::ops::AddAssign for SyncCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.updated += rhs.updated;
        self.removed += rhs.removed;
    }
}

/// The three disjoint outputs of a snapshot comparison, each sorted by
/// identity key.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub created: Vec<KeyedRecord>,
    pub updated: Vec<UpdatedRecord>,
    pub removed: Vec<KeyedRecord>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            added: self.created.len(),
            updated: self.updated.len(),
            removed: self.removed.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Flatten into change-log rows: created, then updated, then removed,
    /// each already sorted by identity key.
    #[must_use]
    pub fn into_change_records(
        self,
        dataset: &DatasetName,
        timestamp: DateTime<Utc>,
    ) -> Vec<ChangeRecord> {
        let mut out =
            Vec::with_capacity(self.created.len() + self.updated.len() + self.removed.len());
        for kr in self.created {
            out.push(ChangeRecord::from_payload(
                dataset,
                timestamp,
                ChangeAction::Created,
                kr.key,
                &kr.record,
                None,
                Some(&kr.record),
            ));
        }
        for ur in self.updated {
            out.push(ChangeRecord::from_payload(
                dataset,
                timestamp,
                ChangeAction::Updated,
                ur.key,
                &ur.after,
                Some(&ur.before),
                Some(&ur.after),
            ));
        }
        for kr in self.removed {
            out.push(ChangeRecord::from_payload(
                dataset,
                timestamp,
                ChangeAction::Removed,
                kr.key,
                &kr.record,
                Some(&kr.record),
                None,
            ));
        }
        out
    }
}

/// Compare two snapshots of one dataset.
///
/// `value` and `status` are the compared payload fields; any single
/// difference classifies the whole record as updated. A first sync (empty
/// `old`) short-circuits to "everything created" — the set math would give
/// the same answer, but the special case is explicit.
#[must_use]
pub fn snapshot_diff(
    old: &[FeatureRecord],
    new: &[FeatureRecord],
    spec: &KeySpec,
) -> SnapshotDiff {
    // BTreeMap gives the sorted-by-key iteration the determinism contract
    // needs. Duplicate keys within one snapshot: last row wins.
    let new_by_key: BTreeMap<String, &FeatureRecord> = new
        .iter()
        .map(|r| (spec.identity_key(r), r))
        .collect();

    if old.is_empty() {
        // First sync: every record is created.
        return SnapshotDiff {
            created: new_by_key
                .into_iter()
                .map(|(key, record)| KeyedRecord {
                    key,
                    record: record.clone(),
                })
                .collect(),
            ..Default::default()
        };
    }

    let old_by_key: BTreeMap<String, &FeatureRecord> = old
        .iter()
        .map(|r| (spec.identity_key(r), r))
        .collect();

    let mut diff = SnapshotDiff::default();

    for (key, record) in &new_by_key {
        match old_by_key.get(key) {
            None => diff.created.push(KeyedRecord {
                key: key.clone(),
                record: (*record).clone(),
            }),
            Some(before) => {
                if payload_differs(before, record) {
                    diff.updated.push(UpdatedRecord {
                        key: key.clone(),
                        before: (*before).clone(),
                        after: (*record).clone(),
                    });
                }
            }
        }
    }

    for (key, record) in &old_by_key {
        if !new_by_key.contains_key(key) {
            diff.removed.push(KeyedRecord {
                key: key.clone(),
                record: (*record).clone(),
            });
        }
    }

    diff
}

fn payload_differs(before: &FeatureRecord, after: &FeatureRecord) -> bool {
    before.value != after.value || before.status != after.status
}

/// One row of the change log.
///
/// Identity dimensions are copied onto the row so the log is queryable
/// without joining back to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub dataset_group: String,
    pub dataset_feature: String,
    pub action: ChangeAction,
    pub model_name: String,
    pub solution: String,
    pub feature_group: String,
    pub feature_name: String,
    pub mode: String,
    pub mcc: String,
    pub mnc: String,
    pub region: String,
    pub country: String,
    pub operator: String,
    pub sp_fci: String,
    pub before_value: String,
    pub after_value: String,
    pub before_status: String,
    pub after_status: String,
    pub identity_key: String,
}

impl ChangeRecord {
    fn from_payload(
        dataset: &DatasetName,
        timestamp: DateTime<Utc>,
        action: ChangeAction,
        identity_key: String,
        dims: &FeatureRecord,
        before: Option<&FeatureRecord>,
        after: Option<&FeatureRecord>,
    ) -> Self {
        Self {
            timestamp,
            dataset_group: dataset.group.clone(),
            dataset_feature: dataset.feature.clone(),
            action,
            model_name: dims.model_name.clone(),
            solution: dims.solution.clone(),
            feature_group: dims.feature_group.clone(),
            feature_name: dims.feature_name.clone(),
            mode: dims.mode.clone(),
            mcc: dims.mcc.clone(),
            mnc: dims.mnc.clone(),
            region: dims.region.clone(),
            country: dims.country.clone(),
            operator: dims.operator.clone(),
            sp_fci: dims.sp_fci.clone(),
            before_value: before.map(|r| r.value.clone()).unwrap_or_default(),
            after_value: after.map(|r| r.value.clone()).unwrap_or_default(),
            before_status: before.map(|r| r.status.clone()).unwrap_or_default(),
            after_status: after.map(|r| r.status.clone()).unwrap_or_default(),
            identity_key,
        }
    }

    /// Case-insensitive substring match across every field.
    #[must_use]
    pub fn matches(&self, needle_lower: &str) -> bool {
        let fields: [&str; 19] = [
            &self.dataset_group,
            &self.dataset_feature,
            self.action.as_str(),
            &self.model_name,
            &self.solution,
            &self.feature_group,
            &self.feature_name,
            &self.mode,
            &self.mcc,
            &self.mnc,
            &self.region,
            &self.country,
            &self.operator,
            &self.sp_fci,
            &self.before_value,
            &self.after_value,
            &self.before_status,
            &self.after_status,
            &self.identity_key,
        ];
        fields
            .iter()
            .any(|f| f.to_lowercase().contains(needle_lower))
            || self
                .timestamp
                .to_rfc3339()
                .to_lowercase()
                .contains(needle_lower)
    }
}
