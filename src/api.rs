//! Upstream API seam.
//!
//! The sync orchestrator only ever talks to the read-only upstream through
//! the [`FeatureApi`] trait, so tests (and offline demos) can swap in an
//! in-memory implementation. [`HttpFeatureApi`] is the production
//! implementation: GET-only, paginated, with a bounded timeout and optional
//! entity-tag short-circuiting.

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::SyncError;
use crate::record::{DatasetName, FeatureRecord};

const PATH_GROUPS: &str = "feature-groups/";
const PATH_FEATURES: &str = "features/";
const PATH_RECORDS: &str = "feature-records/";

/// Result of a record fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Fresh records, plus the entity tag to present on the next fetch.
    Modified {
        records: Vec<FeatureRecord>,
        etag: Option<String>,
    },
    /// Upstream confirmed the cached snapshot is still current (HTTP 304).
    NotModified,
}

/// Read-only upstream source of feature records.
#[async_trait]
pub trait FeatureApi: Send + Sync {
    /// List all feature-group names.
    async fn list_groups(&self) -> Result<Vec<String>, SyncError>;

    /// List feature names within a group.
    async fn list_features(&self, group: &str) -> Result<Vec<String>, SyncError>;

    /// Fetch every record of a dataset, collecting all pages.
    ///
    /// `etag` is the tag from the previous successful fetch, if any;
    /// implementations that don't support conditional fetches simply
    /// ignore it and always return [`FetchOutcome::Modified`].
    async fn fetch_records(
        &self,
        dataset: &DatasetName,
        etag: Option<&str>,
    ) -> Result<FetchOutcome, SyncError>;
}

/// Upstream list responses come either as plain strings or `{"name": ...}`
/// objects depending on the backend version.
#[derive(Deserialize)]
#[serde(untagged)]
enum NameEntry {
    Named { name: String },
    Plain(String),
}

impl NameEntry {
    fn into_name(self) -> String {
        match self {
            NameEntry::Named { name } => name,
            NameEntry::Plain(name) => name,
        }
    }
}

/// Record payloads come either as a bare JSON array or a DRF-style
/// `{"results": [...], "next": ...}` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsPage {
    Envelope {
        results: Vec<FeatureRecord>,
        #[serde(default)]
        next: Option<String>,
    },
    Bare(Vec<FeatureRecord>),
}

/// HTTP implementation of [`FeatureApi`] backed by `reqwest`.
pub struct HttpFeatureApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
}

impl HttpFeatureApi {
    pub fn new(config: &CacheConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| SyncError::Fetch(format!("http client init: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(self.url(path));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }
        req
    }

    async fn get_names(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<String>, SyncError> {
        let resp = self
            .request(path)
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::Fetch(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| SyncError::Fetch(e.to_string()))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| SyncError::Fetch(e.to_string()))?;
        let entries: Vec<NameEntry> =
            serde_json::from_slice(&body).map_err(|e| SyncError::Parse(e.to_string()))?;
        Ok(entries.into_iter().map(NameEntry::into_name).collect())
    }
}

#[async_trait]
impl FeatureApi for HttpFeatureApi {
    async fn list_groups(&self) -> Result<Vec<String>, SyncError> {
        self.get_names(PATH_GROUPS, &[]).await
    }

    async fn list_features(&self, group: &str) -> Result<Vec<String>, SyncError> {
        self.get_names(PATH_FEATURES, &[("group", group)]).await
    }

    async fn fetch_records(
        &self,
        dataset: &DatasetName,
        etag: Option<&str>,
    ) -> Result<FetchOutcome, SyncError> {
        let mut records = Vec::new();
        let mut page = 1usize;
        let mut new_etag = None;
        let page_size = self.page_size.to_string();

        loop {
            let page_str = page.to_string();
            let mut req = self.request(PATH_RECORDS).query(&[
                ("group", dataset.group.as_str()),
                ("feature", dataset.feature.as_str()),
                ("page", page_str.as_str()),
                ("page_size", page_size.as_str()),
            ]);
            // Conditional fetch only makes sense on the first page: a 304
            // covers the whole dataset.
            if page == 1 {
                if let Some(tag) = etag {
                    req = req.header(IF_NONE_MATCH, tag);
                }
            }

            let resp = req.send().await.map_err(|e| SyncError::Fetch(e.to_string()))?;
            if page == 1 && resp.status() == StatusCode::NOT_MODIFIED {
                debug!(dataset = %dataset, "upstream reports not modified");
                return Ok(FetchOutcome::NotModified);
            }
            let resp = resp
                .error_for_status()
                .map_err(|e| SyncError::Fetch(e.to_string()))?;
            if page == 1 {
                new_etag = resp
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
            }
            let body = resp
                .bytes()
                .await
                .map_err(|e| SyncError::Fetch(e.to_string()))?;
            let parsed: RecordsPage =
                serde_json::from_slice(&body).map_err(|e| SyncError::Parse(e.to_string()))?;

            match parsed {
                RecordsPage::Bare(rows) => {
                    // Unpaginated backend: one response is the whole dataset.
                    records.extend(rows);
                    break;
                }
                RecordsPage::Envelope { results, next } => {
                    let got = results.len();
                    records.extend(results);
                    if next.is_none() || got == 0 {
                        break;
                    }
                    page += 1;
                }
            }
        }

        debug!(dataset = %dataset, rows = records.len(), pages = page, "records fetched");
        Ok(FetchOutcome::Modified {
            records,
            etag: new_etag,
        })
    }
}
