//! Configuration for the cache service.
//!
//! # Example
//!
//! ```
//! use fmw_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.changelog_cap, 5000);
//!
//! // Full config
//! let config = CacheConfig {
//!     api_base_url: "http://backend.example.com/v1".into(),
//!     api_key: Some("secret".into()),
//!     cache_dir: "./_cache_v1".into(),
//!     max_age_hours: 6,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;

use serde::Deserialize;

/// Configuration for the cache service.
///
/// All fields have sensible defaults; at minimum you should point
/// `api_base_url` at the upstream read-only API.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Base URL of the upstream read-only API (e.g. "http://localhost:8000/v1")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Optional API key sent as the `X-API-KEY` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Verify upstream TLS certificates (disable only against dev backends)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Root directory for snapshots, metadata and the change log
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Upstream fetch timeout in seconds (default: 60)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Page size for paginated record fetches
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Snapshot max age before a refresh is due (default: 24h)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Change log retention bound (default: 5000 entries)
    #[serde(default = "default_changelog_cap")]
    pub changelog_cap: usize,

    /// Whether identity keys distinguish case (default: true)
    #[serde(default = "default_case_sensitive_keys")]
    pub case_sensitive_keys: bool,

    /// Keep one historical snapshot per dataset per calendar day
    #[serde(default = "default_keep_daily_snapshots")]
    pub keep_daily_snapshots: bool,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_verify_tls() -> bool {
    true
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./_cache")
}
fn default_fetch_timeout_secs() -> u64 {
    60
}
fn default_page_size() -> usize {
    500
}
fn default_max_age_hours() -> u64 {
    24
}
fn default_changelog_cap() -> usize {
    crate::changelog::DEFAULT_CHANGELOG_CAP
}
fn default_case_sensitive_keys() -> bool {
    true
}
fn default_keep_daily_snapshots() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: None,
            verify_tls: default_verify_tls(),
            cache_dir: default_cache_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            page_size: default_page_size(),
            max_age_hours: default_max_age_hours(),
            changelog_cap: default_changelog_cap(),
            case_sensitive_keys: default_case_sensitive_keys(),
            keep_daily_snapshots: default_keep_daily_snapshots(),
        }
    }
}
