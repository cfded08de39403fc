//! Feature record data structures.
//!
//! A [`FeatureRecord`] is one row of the upstream feature matrix: which
//! device model exposes which feature, for which operator/network, and in
//! which mode. Upstream schemas are heterogeneous, so every field is
//! optional on the wire and defaults to the empty string.

use serde::{Deserialize, Serialize};

/// One row of the feature matrix.
///
/// The first eleven fields are the identity dimensions (see
/// [`crate::identity::KeySpec`]); `value`, `status` and `updated_at` are the
/// mutable payload compared by the diff engine.
///
/// # Example
///
/// ```
/// use fmw_cache::FeatureRecord;
///
/// let rec = FeatureRecord {
///     model_name: "S21".into(),
///     feature_group: "IMS".into(),
///     feature_name: "VoLTE".into(),
///     operator: "KT".into(),
///     value: "true".into(),
///     status: "active".into(),
///     ..Default::default()
/// };
/// assert_eq!(rec.solution, "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub feature_group: String,
    #[serde(default)]
    pub feature_name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub mcc: String,
    #[serde(default)]
    pub mnc: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub operator: String,
    /// Service-profile code (some upstream variants call this `sp_type`).
    #[serde(default, alias = "sp_type")]
    pub sp_fci: String,

    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "sync_time")]
    pub updated_at: String,
}

/// Cache-name prefix for record datasets. Reserved metadata names (like the
/// `sync_all` summary under `index`) never start with this prefix.
pub const RECORDS_PREFIX: &str = "records__";

/// A logical dataset: one group + feature pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetName {
    pub group: String,
    pub feature: String,
}

impl DatasetName {
    pub fn new(group: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            feature: feature.into(),
        }
    }

    /// The on-disk cache name, e.g. `records__IMS__VoLTE`.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}{}__{}", RECORDS_PREFIX, self.group, self.feature)
    }

    /// Parse a cache name back into a dataset name.
    ///
    /// Returns `None` for names that are not record datasets (e.g. `index`).
    #[must_use]
    pub fn from_cache_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(RECORDS_PREFIX)?;
        let (group, feature) = rest.split_once("__")?;
        Some(Self::new(group, feature))
    }
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.feature)
    }
}
