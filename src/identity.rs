//! Identity keyer.
//!
//! Derives a stable composite key for a record from a fixed, ordered list of
//! dimension fields. Two records with the same dimension values are the same
//! logical entity across snapshots, whatever their payload says.

use serde::{Deserialize, Serialize};

use crate::record::FeatureRecord;

/// Delimiter joining dimension values. Not expected to appear in values.
pub const KEY_DELIMITER: char = '|';

/// One identity dimension of a [`FeatureRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    ModelName,
    Solution,
    FeatureGroup,
    FeatureName,
    Mcc,
    Mnc,
    Region,
    Country,
    Operator,
    SpFci,
    Mode,
}

impl Dimension {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::ModelName => "model_name",
            Dimension::Solution => "solution",
            Dimension::FeatureGroup => "feature_group",
            Dimension::FeatureName => "feature_name",
            Dimension::Mcc => "mcc",
            Dimension::Mnc => "mnc",
            Dimension::Region => "region",
            Dimension::Country => "country",
            Dimension::Operator => "operator",
            Dimension::SpFci => "sp_fci",
            Dimension::Mode => "mode",
        }
    }

    /// The value of this dimension on a record. Absent fields are already
    /// the empty string (lenient-key policy).
    #[must_use]
    pub fn value<'a>(&self, record: &'a FeatureRecord) -> &'a str {
        match self {
            Dimension::ModelName => &record.model_name,
            Dimension::Solution => &record.solution,
            Dimension::FeatureGroup => &record.feature_group,
            Dimension::FeatureName => &record.feature_name,
            Dimension::Mcc => &record.mcc,
            Dimension::Mnc => &record.mnc,
            Dimension::Region => &record.region,
            Dimension::Country => &record.country,
            Dimension::Operator => &record.operator,
            Dimension::SpFci => &record.sp_fci,
            Dimension::Mode => &record.mode,
        }
    }
}

/// The full dimension list in canonical order.
pub const DEFAULT_DIMENSIONS: [Dimension; 11] = [
    Dimension::ModelName,
    Dimension::Solution,
    Dimension::FeatureGroup,
    Dimension::FeatureName,
    Dimension::Mcc,
    Dimension::Mnc,
    Dimension::Region,
    Dimension::Country,
    Dimension::Operator,
    Dimension::SpFci,
    Dimension::Mode,
];

/// How identity keys are derived for a dataset.
///
/// The dimension list is configurable because upstream variants disagree on
/// the column set (`sp_fci` vs `sp_type`, presence of `solution`). Case
/// sensitivity is configurable because variants also disagree on whether
/// `"KT"` and `"kt"` are the same operator; the default is case-sensitive.
///
/// # Example
///
/// ```
/// use fmw_cache::{FeatureRecord, KeySpec};
///
/// let spec = KeySpec::default();
/// let rec = FeatureRecord { model_name: "S21".into(), ..Default::default() };
/// let key = spec.identity_key(&rec);
/// assert!(key.starts_with("S21|"));
/// assert_eq!(key, spec.identity_key(&rec));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    /// Ordered dimension fields joined into the key.
    pub dimensions: Vec<Dimension>,
    /// When false, values are trimmed and lowercased before joining.
    pub case_sensitive: bool,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS.to_vec(),
            case_sensitive: true,
        }
    }
}

impl KeySpec {
    #[must_use]
    pub fn case_insensitive() -> Self {
        Self {
            case_sensitive: false,
            ..Self::default()
        }
    }

    /// Derive the composite identity key for a record.
    ///
    /// Deterministic: the dimension order is fixed and explicit, so repeated
    /// calls (and calls in other processes) produce the same string.
    #[must_use]
    pub fn identity_key(&self, record: &FeatureRecord) -> String {
        let mut parts = Vec::with_capacity(self.dimensions.len());
        for dim in &self.dimensions {
            let raw = dim.value(record);
            if self.case_sensitive {
                parts.push(raw.to_string());
            } else {
                parts.push(raw.trim().to_lowercase());
            }
        }
        parts.join(&KEY_DELIMITER.to_string())
    }
}
