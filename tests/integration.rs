//! End-to-end tests for the cache service against an in-memory upstream.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tempfile::tempdir;

use fmw_cache::{
    CacheConfig, CacheService, ChangeAction, ChangeFilter, DatasetName, FeatureApi, FeatureRecord,
    FetchOutcome, Freshness, SyncError,
};

/// In-memory upstream with per-dataset record sets, entity-tag support and
/// failure injection.
struct MockApi {
    datasets: RwLock<HashMap<DatasetName, Vec<FeatureRecord>>>,
    etag: RwLock<Option<String>>,
    unreachable: AtomicBool,
    fetches: AtomicUsize,
}

impl MockApi {
    fn new() -> Self {
        Self {
            datasets: RwLock::new(HashMap::new()),
            etag: RwLock::new(None),
            unreachable: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    fn set_records(&self, dataset: &DatasetName, records: Vec<FeatureRecord>) {
        self.datasets.write().insert(dataset.clone(), records);
    }

    fn set_etag(&self, etag: &str) {
        *self.etag.write() = Some(etag.to_string());
    }

    fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Release);
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }
}

#[async_trait]
impl FeatureApi for MockApi {
    async fn list_groups(&self) -> Result<Vec<String>, SyncError> {
        if self.unreachable.load(Ordering::Acquire) {
            return Err(SyncError::Fetch("connection refused".into()));
        }
        let mut groups: Vec<String> = self
            .datasets
            .read()
            .keys()
            .map(|d| d.group.clone())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        Ok(groups)
    }

    async fn list_features(&self, group: &str) -> Result<Vec<String>, SyncError> {
        let mut features: Vec<String> = self
            .datasets
            .read()
            .keys()
            .filter(|d| d.group == group)
            .map(|d| d.feature.clone())
            .collect();
        features.sort_unstable();
        Ok(features)
    }

    async fn fetch_records(
        &self,
        dataset: &DatasetName,
        etag: Option<&str>,
    ) -> Result<FetchOutcome, SyncError> {
        self.fetches.fetch_add(1, Ordering::AcqRel);
        if self.unreachable.load(Ordering::Acquire) {
            return Err(SyncError::Fetch("connection refused".into()));
        }
        let current = self.etag.read().clone();
        if let (Some(have), Some(sent)) = (&current, etag) {
            if have == sent {
                return Ok(FetchOutcome::NotModified);
            }
        }
        let records = self
            .datasets
            .read()
            .get(dataset)
            .cloned()
            .unwrap_or_default();
        Ok(FetchOutcome::Modified {
            records,
            etag: current,
        })
    }
}

fn rec(group: &str, feature: &str, model: &str, value: &str, status: &str) -> FeatureRecord {
    FeatureRecord {
        model_name: model.into(),
        feature_group: group.into(),
        feature_name: feature.into(),
        value: value.into(),
        status: status.into(),
        ..Default::default()
    }
}

fn service(dir: &Path, api: Arc<MockApi>) -> CacheService {
    let config = CacheConfig {
        cache_dir: dir.to_path_buf(),
        ..Default::default()
    };
    CacheService::new(config, api).unwrap()
}

#[tokio::test]
async fn first_sync_then_update_and_create() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(
        &ds,
        vec![
            rec("IMS", "VoLTE", "S21", "true", "active"),
            rec("IMS", "VoLTE", "S22", "false", "active"),
        ],
    );
    let svc = service(dir.path(), api.clone());

    let counts = svc.sync(&ds).await.unwrap();
    assert_eq!(counts.added, 2);
    assert_eq!(svc.load(&ds).len(), 2);

    // One value flips, one new model appears
    api.set_records(
        &ds,
        vec![
            rec("IMS", "VoLTE", "S21", "false", "active"),
            rec("IMS", "VoLTE", "S22", "false", "active"),
            rec("IMS", "VoLTE", "S23", "true", "active"),
        ],
    );
    let counts = svc.sync(&ds).await.unwrap();
    assert_eq!(counts.added, 1);
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.removed, 0);

    let changes = svc.query_changes(&ChangeFilter::default(), 100).unwrap();
    // 2 created on first sync + 1 created + 1 updated on second
    assert_eq!(changes.len(), 4);
    let updated = changes
        .iter()
        .find(|c| c.action == ChangeAction::Updated)
        .unwrap();
    assert_eq!(updated.model_name, "S21");
    assert_eq!(updated.before_value, "true");
    assert_eq!(updated.after_value, "false");
}

#[tokio::test]
async fn upstream_outage_preserves_last_known_good() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let svc = service(dir.path(), api.clone());

    svc.sync(&ds).await.unwrap();
    let ts = svc.last_sync_at(&ds).unwrap();
    let log_len = svc.query_changes(&ChangeFilter::default(), 100).unwrap().len();

    api.set_unreachable(true);
    assert!(matches!(
        svc.sync(&ds).await.unwrap_err(),
        SyncError::Fetch(_)
    ));

    // Snapshot, metadata and change log all untouched
    assert_eq!(svc.load(&ds).len(), 1);
    assert_eq!(svc.last_sync_at(&ds), Some(ts));
    assert_eq!(
        svc.query_changes(&ChangeFilter::default(), 100).unwrap().len(),
        log_len
    );
}

#[tokio::test]
async fn repeated_sync_is_idempotent() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let svc = service(dir.path(), api);

    svc.sync(&ds).await.unwrap();
    for _ in 0..3 {
        let counts = svc.sync(&ds).await.unwrap();
        assert!(counts.is_empty());
    }
    assert_eq!(
        svc.query_changes(&ChangeFilter::default(), 100).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn removal_is_detected() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(
        &ds,
        vec![
            rec("IMS", "VoLTE", "S21", "true", "active"),
            rec("IMS", "VoLTE", "S22", "true", "active"),
        ],
    );
    let svc = service(dir.path(), api.clone());
    svc.sync(&ds).await.unwrap();

    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let counts = svc.sync(&ds).await.unwrap();
    assert_eq!(counts.removed, 1);

    let removed = svc
        .query_changes(
            &ChangeFilter {
                action: Some(ChangeAction::Removed),
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].model_name, "S22");
    assert_eq!(removed[0].before_value, "true");
    assert_eq!(removed[0].after_value, "");
}

#[tokio::test]
async fn sync_all_covers_every_dataset() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let volte = DatasetName::new("IMS", "VoLTE");
    let vowifi = DatasetName::new("IMS", "VoWiFi");
    let chat = DatasetName::new("RCS", "RCS_CHAT");
    api.set_records(&volte, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    api.set_records(&vowifi, vec![rec("IMS", "VoWiFi", "S21", "false", "active")]);
    api.set_records(
        &chat,
        vec![
            rec("RCS", "RCS_CHAT", "S21", "true", "active"),
            rec("RCS", "RCS_CHAT", "S22", "true", "active"),
        ],
    );
    let svc = service(dir.path(), api);

    let summary = svc.sync_all().await.unwrap();
    assert_eq!(summary.groups, 2);
    assert_eq!(summary.features, 3);
    assert_eq!(summary.counts.added, 4);
    assert!(summary.failed.is_empty());

    assert_eq!(svc.load(&volte).len(), 1);
    assert_eq!(svc.load(&chat).len(), 2);
    assert!(svc.last_full_sync_at().is_some());
}

#[tokio::test]
async fn freshness_and_refresh_if_stale() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let svc = service(dir.path(), api);

    assert_eq!(svc.freshness(&ds), Freshness::NeverSynced);

    // Never synced counts as stale: refresh runs
    let ran = svc.refresh_if_stale(&ds).await.unwrap();
    assert_eq!(ran.unwrap().added, 1);
    assert_eq!(svc.freshness(&ds), Freshness::Fresh);

    // Fresh cache: no upstream round-trip
    assert!(svc.refresh_if_stale(&ds).await.unwrap().is_none());
}

#[tokio::test]
async fn etag_short_circuit_keeps_snapshot() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    api.set_etag("v1");
    let svc = service(dir.path(), api.clone());

    svc.sync(&ds).await.unwrap();
    let first_sync = svc.last_sync_at(&ds).unwrap();

    // Second cycle presents the stored tag; upstream answers not-modified
    let counts = svc.sync(&ds).await.unwrap();
    assert!(counts.is_empty());
    assert_eq!(api.fetch_count(), 2);
    assert_eq!(svc.load(&ds).len(), 1);
    // The clock still advanced: the snapshot was confirmed current
    assert!(svc.last_sync_at(&ds).unwrap() >= first_sync);
}

#[tokio::test]
async fn daily_snapshot_is_retained_and_readable() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let svc = service(dir.path(), api.clone());

    svc.sync(&ds).await.unwrap();
    let today = Utc::now().date_naive();

    // Only the first cycle of the day is retained; later cycles don't
    // overwrite it
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "false", "active")]);
    svc.sync(&ds).await.unwrap();

    let historical = svc.load_as_of(&ds, today).unwrap().unwrap();
    assert_eq!(historical.len(), 1);
    assert_eq!(historical[0].value, "true");
    assert_eq!(svc.load(&ds)[0].value, "false");
}

#[tokio::test]
async fn trend_and_today_count_reflect_sync_activity() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(
        &ds,
        vec![
            rec("IMS", "VoLTE", "S21", "true", "active"),
            rec("IMS", "VoLTE", "S22", "true", "active"),
        ],
    );
    let svc = service(dir.path(), api);

    svc.sync(&ds).await.unwrap();
    assert_eq!(svc.today_change_count().unwrap(), 2);

    let trend = svc.trend(Some(&ds), 7).unwrap();
    assert_eq!(trend.len(), 7);
    assert_eq!(trend.last().unwrap().created, 2);
    assert!(trend[..6].iter().all(|d| d.created == 0));

    // A dataset with no activity has an all-zero window
    let other = DatasetName::new("RCS", "RCS_CHAT");
    let trend = svc.trend(Some(&other), 7).unwrap();
    assert!(trend.iter().all(|d| d.created + d.updated + d.removed == 0));
}

#[tokio::test]
async fn state_survives_service_restart() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);

    let ts = {
        let svc = service(dir.path(), api.clone());
        svc.sync(&ds).await.unwrap();
        svc.last_sync_at(&ds).unwrap()
    };

    // A fresh service over the same directory sees everything
    let svc = service(dir.path(), api.clone());
    assert_eq!(svc.load(&ds).len(), 1);
    assert_eq!(svc.last_sync_at(&ds), Some(ts));
    assert_eq!(
        svc.query_changes(&ChangeFilter::default(), 100).unwrap().len(),
        1
    );

    // And its next sync diffs against the persisted snapshot
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "false", "active")]);
    let counts = svc.sync(&ds).await.unwrap();
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.added, 0);
}

#[tokio::test]
async fn load_on_empty_cache_dir_is_empty_not_error() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path(), Arc::new(MockApi::new()));
    let ds = DatasetName::new("IMS", "VoLTE");
    assert!(svc.load(&ds).is_empty());
    assert!(svc.last_sync_at(&ds).is_none());
}

#[tokio::test]
async fn empty_upstream_removes_all_records() {
    let dir = tempdir().unwrap();
    let api = Arc::new(MockApi::new());
    let ds = DatasetName::new("IMS", "VoLTE");
    api.set_records(&ds, vec![rec("IMS", "VoLTE", "S21", "true", "active")]);
    let svc = service(dir.path(), api.clone());
    svc.sync(&ds).await.unwrap();

    // Upstream legitimately returns an empty dataset
    api.set_records(&ds, vec![]);
    let counts = svc.sync(&ds).await.unwrap();
    assert_eq!(counts.removed, 1);
    assert!(svc.load(&ds).is_empty());
}
