//! Server capabilities learned during negotiation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Feature names recorded by capability negotiation.
pub mod names {
    /// FHIR release name (`DSTU2`, `STU3`, `R4`, `R4B`, `R5`)
    pub const VERSION_NAME: &str = "versionName";
    /// Raw `fhirVersion` of the capability statement
    pub const FHIR_VERSION: &str = "fhirVersion";
    /// `software.name` of the capability statement
    pub const SOFTWARE_NAME: &str = "softwareName";
    /// A representative resource type (Patient) can be searched
    pub const HAS_PATIENTS: &str = "hasPatients";
    /// The `:missing` search modifier is honoured
    pub const HAS_MISSING_MODIFIER: &str = "hasMissingModifier";
    /// `batch` bundles are accepted
    pub const HAS_BATCH_SUPPORT: &str = "hasBatchSupport";
    /// `_sort=-date` is honoured
    pub const HAS_SORT_BY_DATE: &str = "hasSortByDate";
    /// A secondary `_id` sort key is honoured
    pub const HAS_SORT_BY_SECONDARY_KEY: &str = "hasSortBySecondaryKey";
    /// `CodeSystem/$lookup` is available
    pub const HAS_LOOKUP_OPERATION: &str = "hasLookupOperation";
    /// `:missing=true` and `:missing=false` counts add up to the total
    pub const HAS_RELIABLE_MISSING_COUNTS: &str = "hasReliableMissingCounts";
    /// Prefix of per-resource-type read access flags, e.g. `canReadObservation`
    pub const CAN_READ_PREFIX: &str = "canRead";
}

/// A single feature value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Supported or not
    Flag(bool),
    /// Textual capability such as a version name
    Text(String),
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Flag(value)
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<&FeatureValue> for JsonValue {
    fn from(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Flag(flag) => JsonValue::Bool(*flag),
            FeatureValue::Text(text) => JsonValue::String(text.clone()),
        }
    }
}

/// Flat, immutable map of capability name to value.
///
/// Built once per negotiation and replaced wholesale on reconnection.
///
/// # Examples
///
/// ```
/// use cohort_core::{ServerFeatures, features::names};
///
/// let features = ServerFeatures::from_iter([
///     (names::VERSION_NAME.to_string(), "R4".into()),
///     (names::HAS_BATCH_SUPPORT.to_string(), true.into()),
/// ]);
/// assert!(features.flag(names::HAS_BATCH_SUPPORT));
/// assert!(!features.flag(names::HAS_SORT_BY_DATE));
/// assert_eq!(features.version_name(), Some("R4"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFeatures(BTreeMap<String, FeatureValue>);

impl ServerFeatures {
    /// Boolean feature; absent or textual features read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(FeatureValue::Flag(true)))
    }

    /// Textual feature.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(FeatureValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Raw value.
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Negotiated FHIR release name.
    pub fn version_name(&self) -> Option<&str> {
        self.text(names::VERSION_NAME)
    }

    /// Iterate features in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.0.iter()
    }

    /// Number of recorded features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object of every feature, in name order.
    ///
    /// ```
    /// use cohort_core::{ServerFeatures, features::names};
    ///
    /// let features = ServerFeatures::from_iter([
    ///     (names::VERSION_NAME.to_string(), "R4".into()),
    ///     (names::HAS_PATIENTS.to_string(), true.into()),
    /// ]);
    /// assert_eq!(
    ///     features.to_json(),
    ///     serde_json::json!({ "hasPatients": true, "versionName": "R4" })
    /// );
    /// ```
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), JsonValue::from(value)))
                .collect(),
        )
    }
}

impl FromIterator<(String, FeatureValue)> for ServerFeatures {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
