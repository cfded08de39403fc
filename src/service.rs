// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache service: the sync orchestrator.
//!
//! [`CacheService`] owns the write path to the snapshot store, the sync
//! metadata and the change log. Readers (the UI layer) only ever call the
//! read-only methods; they never compute diffs themselves.
//!
//! One sync cycle:
//!
//! ```text
//! fetch (paginated, bounded timeout)
//!   → diff against stored snapshot (identity-keyed)
//!     → write new snapshot (atomic replace)
//!     → append change log (deduped, bounded)
//!     → write sync metadata (timestamp + counts)
//! ```
//!
//! Fetch and parse failures abort the cycle before any write: stale but
//! consistent beats partially updated. Within one dataset, cycles are
//! serialized by a per-dataset lock; different datasets sync in parallel.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{FeatureApi, FetchOutcome};
use crate::changelog::{ChangeFilter, ChangeLog, DailyTrend};
use crate::config::CacheConfig;
use crate::diff::{snapshot_diff, ChangeRecord, SyncCounts};
use crate::error::{StorageError, SyncError};
use crate::identity::KeySpec;
use crate::record::{DatasetName, FeatureRecord};
use crate::snapshot::{SnapshotStore, SyncMetadata};
use crate::staleness::{needs_refresh, Freshness};

/// Metadata name for the whole-pass `sync_all` summary.
const INDEX_NAME: &str = "index";

const CHANGELOG_FILE: &str = "recent_changes.csv";

/// Aggregate result of a [`CacheService::sync_all`] pass.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub groups: usize,
    pub features: usize,
    pub counts: SyncCounts,
    /// Datasets that failed this pass, with the failure message. Their
    /// caches are untouched.
    pub failed: Vec<String>,
}

/// Snapshot cache and change-detection engine.
///
/// Explicitly constructed with an injected storage root (via
/// [`CacheConfig::cache_dir`]) and an injected upstream client, so tests can
/// run against a temp directory and an in-memory [`FeatureApi`].
pub struct CacheService {
    config: CacheConfig,
    store: SnapshotStore,
    changelog: ChangeLog,
    api: Arc<dyn FeatureApi>,
    key_spec: KeySpec,
    /// At most one in-flight sync per dataset.
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Entity tags from the last successful fetch, per dataset.
    etags: DashMap<String, String>,
}

impl CacheService {
    pub fn new(config: CacheConfig, api: Arc<dyn FeatureApi>) -> Result<Self, StorageError> {
        let store = SnapshotStore::open(&config.cache_dir)?;
        let changelog = ChangeLog::open(
            config.cache_dir.join(CHANGELOG_FILE),
            config.changelog_cap,
        )?;
        let key_spec = KeySpec {
            case_sensitive: config.case_sensitive_keys,
            ..KeySpec::default()
        };
        Ok(Self {
            config,
            store,
            changelog,
            api,
            key_spec,
            locks: DashMap::new(),
            etags: DashMap::new(),
        })
    }

    /// Override the identity-key derivation (dimension list and case
    /// handling) for upstreams with a non-standard column set.
    #[must_use]
    pub fn with_key_spec(mut self, key_spec: KeySpec) -> Self {
        self.key_spec = key_spec;
        self
    }

    #[must_use]
    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    fn max_age(&self) -> Duration {
        Duration::hours(self.config.max_age_hours as i64)
    }

    fn dataset_lock(&self, cache_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(cache_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // --- Write path (exclusively owned by this service) ---

    /// Run one sync cycle for a dataset.
    ///
    /// Serialized per dataset; a second concurrent call waits for the first
    /// and then runs against the fresh snapshot (typically a no-op diff).
    #[tracing::instrument(skip(self), fields(dataset = %dataset))]
    pub async fn sync(&self, dataset: &DatasetName) -> Result<SyncCounts, SyncError> {
        let cache_name = dataset.cache_name();
        let lock = self.dataset_lock(&cache_name);
        let _guard = lock.lock().await;
        let start = Instant::now();
        let label = dataset.to_string();

        let etag = self.etags.get(&cache_name).map(|e| e.value().clone());
        let outcome = match self.api.fetch_records(dataset, etag.as_deref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "sync aborted, cache untouched");
                crate::metrics::record_sync(&label, failure_status(&e));
                return Err(e);
            }
        };

        let (records, new_etag) = match outcome {
            FetchOutcome::NotModified => {
                // Prior snapshot is still current; just refresh the clock.
                let meta = SyncMetadata {
                    last_sync: Utc::now(),
                    counts: SyncCounts::default(),
                };
                self.store.write_metadata(&cache_name, &meta)?;
                info!("upstream unchanged, snapshot kept");
                crate::metrics::record_sync(&label, "not_modified");
                return Ok(SyncCounts::default());
            }
            FetchOutcome::Modified { records, etag } => (records, etag),
        };

        let old = self.store.read(dataset)?;
        let diff = snapshot_diff(&old, &records, &self.key_spec);
        let counts = diff.counts();
        let now = Utc::now();

        self.store.write(dataset, &records)?;
        if self.config.keep_daily_snapshots {
            self.store.retain_daily(dataset, now.date_naive())?;
        }
        let changes = diff.into_change_records(dataset, now);
        let appended = self.changelog.append(&changes)?;
        self.store.write_metadata(
            &cache_name,
            &SyncMetadata {
                last_sync: now,
                counts,
            },
        )?;
        // Only a fully persisted cycle may advance the stored tag: a tag
        // committed before the writes would make the next fetch 304 against
        // data that never reached disk.
        match new_etag {
            Some(tag) => {
                self.etags.insert(cache_name.clone(), tag);
            }
            None => {
                self.etags.remove(&cache_name);
            }
        }

        info!(
            added = counts.added,
            updated = counts.updated,
            removed = counts.removed,
            rows = records.len(),
            appended,
            "sync cycle complete"
        );
        crate::metrics::record_sync(&label, "success");
        crate::metrics::record_sync_latency(&label, start.elapsed());
        crate::metrics::set_snapshot_rows(&label, records.len());
        crate::metrics::record_changes("created", counts.added);
        crate::metrics::record_changes("updated", counts.updated);
        crate::metrics::record_changes("removed", counts.removed);

        Ok(counts)
    }

    /// Sync every dataset the upstream advertises (groups → features).
    ///
    /// A dataset that fails is skipped, its cache untouched; the pass
    /// continues and the failure is reported in the summary.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<SyncSummary, SyncError> {
        let groups = self.api.list_groups().await?;
        let mut summary = SyncSummary {
            groups: groups.len(),
            ..Default::default()
        };

        for group in &groups {
            let features = match self.api.list_features(group).await {
                Ok(features) => features,
                Err(e) => {
                    warn!(group = %group, error = %e, "feature listing failed, group skipped");
                    summary.failed.push(format!("{group}: {e}"));
                    continue;
                }
            };
            summary.features += features.len();
            for feature in features {
                let dataset = DatasetName::new(group.clone(), feature);
                match self.sync(&dataset).await {
                    Ok(counts) => summary.counts += counts,
                    Err(e) => summary.failed.push(format!("{dataset}: {e}")),
                }
            }
        }

        self.store.write_metadata(
            INDEX_NAME,
            &SyncMetadata {
                last_sync: Utc::now(),
                counts: summary.counts,
            },
        )?;
        info!(
            groups = summary.groups,
            features = summary.features,
            failed = summary.failed.len(),
            "full sync pass complete"
        );
        Ok(summary)
    }

    /// Sync only if the dataset is stale per the configured max age.
    ///
    /// Returns the cycle's counts when a sync ran, `None` when the cache
    /// was fresh enough.
    pub async fn refresh_if_stale(
        &self,
        dataset: &DatasetName,
    ) -> Result<Option<SyncCounts>, SyncError> {
        let last = self.last_sync_at(dataset);
        if !needs_refresh(last, self.max_age(), Utc::now()) {
            return Ok(None);
        }
        self.sync(dataset).await.map(Some)
    }

    // --- Read path (no mutation rights) ---

    /// The current snapshot. Never fails: a missing or unreadable snapshot
    /// is served as empty, with a warning.
    #[must_use]
    pub fn load(&self, dataset: &DatasetName) -> Vec<FeatureRecord> {
        match self.store.read(dataset) {
            Ok(records) => records,
            Err(e) => {
                warn!(dataset = %dataset, error = %e, "snapshot unreadable, serving empty");
                Vec::new()
            }
        }
    }

    /// A historical daily snapshot, if one was retained for that date.
    pub fn load_as_of(
        &self,
        dataset: &DatasetName,
        date: NaiveDate,
    ) -> Result<Option<Vec<FeatureRecord>>, StorageError> {
        self.store.read_as_of(dataset, date)
    }

    /// Timestamp of the last successful sync of this dataset.
    #[must_use]
    pub fn last_sync_at(&self, dataset: &DatasetName) -> Option<DateTime<Utc>> {
        self.metadata_timestamp(&dataset.cache_name())
    }

    /// Timestamp of the last successful full `sync_all` pass.
    #[must_use]
    pub fn last_full_sync_at(&self) -> Option<DateTime<Utc>> {
        self.metadata_timestamp(INDEX_NAME)
    }

    fn metadata_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.store.read_metadata(name) {
            Ok(meta) => meta.map(|m| m.last_sync),
            Err(e) => {
                warn!(name, error = %e, "metadata unreadable");
                None
            }
        }
    }

    /// Diff counts recorded by the dataset's last sync cycle.
    #[must_use]
    pub fn last_sync_counts(&self, dataset: &DatasetName) -> Option<SyncCounts> {
        self.store
            .read_metadata(&dataset.cache_name())
            .ok()
            .flatten()
            .map(|m| m.counts)
    }

    /// Read-path freshness status, for the stale-data indicator.
    #[must_use]
    pub fn freshness(&self, dataset: &DatasetName) -> Freshness {
        Freshness::classify(self.last_sync_at(dataset), self.max_age(), Utc::now())
    }

    /// Query the change log, most-recent-first.
    pub fn query_changes(
        &self,
        filter: &ChangeFilter,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, StorageError> {
        self.changelog.query(filter, limit)
    }

    /// Per-day change counts over the trailing `days` window ending today.
    pub fn trend(
        &self,
        dataset: Option<&DatasetName>,
        days: u32,
    ) -> Result<Vec<DailyTrend>, StorageError> {
        self.changelog.trend(dataset, days, Utc::now().date_naive())
    }

    /// Number of changes logged today (UTC).
    pub fn today_change_count(&self) -> Result<usize, StorageError> {
        self.changelog.count_on(Utc::now().date_naive())
    }
}

fn failure_status(e: &SyncError) -> &'static str {
    match e {
        SyncError::Fetch(_) => "fetch_error",
        SyncError::Parse(_) => "parse_error",
        SyncError::Storage(_) => "storage_error",
    }
}
