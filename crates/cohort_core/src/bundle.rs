//! Wire types of the FHIR `batch` interaction.
//!
//! A batch request is a `Bundle` of type `batch` with one `entry` per logical
//! GET; the server answers with a `batch-response` bundle whose entries map
//! back to the request entries by position.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Outgoing `Bundle` of type `batch`.
///
/// # Examples
///
/// ```
/// use cohort_core::BatchBundle;
///
/// let bundle = BatchBundle::of_gets(["Patient?_count=1", "metadata"]);
/// let json = serde_json::to_value(&bundle).unwrap();
/// assert_eq!(json["resourceType"], "Bundle");
/// assert_eq!(json["type"], "batch");
/// assert_eq!(json["entry"][1]["request"]["url"], "metadata");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchBundle {
    /// Always `Bundle`
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    /// Always `batch`
    #[serde(rename = "type")]
    pub bundle_type: String,
    /// One entry per logical request
    pub entry: Vec<BatchEntry>,
}

/// Entry of an outgoing batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// The logical request
    pub request: BatchEntryRequest,
}

/// Request part of a batch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntryRequest {
    /// HTTP method, always `GET` for combined requests
    pub method: String,
    /// URL relative to the server base
    pub url: String,
}

impl BatchBundle {
    /// Build a batch of GET entries in the given order.
    pub fn of_gets<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: "batch".to_string(),
            entry: urls
                .into_iter()
                .map(|url| BatchEntry {
                    request: BatchEntryRequest {
                        method: "GET".to_string(),
                        url: url.into(),
                    },
                })
                .collect(),
        }
    }
}

/// Incoming `batch-response` bundle. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseBundle {
    /// Response entries, positionally matched to the request entries
    #[serde(default)]
    pub entry: Vec<BatchResponseEntry>,
}

/// One entry of a `batch-response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseEntry {
    /// Resource returned for a successful entry
    #[serde(default)]
    pub resource: Option<JsonValue>,
    /// Status and outcome of the entry
    #[serde(default)]
    pub response: Option<BatchEntryResponse>,
}

/// `entry.response` of a `batch-response`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEntryResponse {
    /// Stringified status line, e.g. `200 OK` or `404`
    #[serde(default)]
    pub status: String,
    /// `OperationOutcome` describing a failed entry
    #[serde(default)]
    pub outcome: Option<JsonValue>,
}

impl BatchResponseEntry {
    /// Numeric status of the entry; 0 when missing or unparsable.
    pub fn status_code(&self) -> u16 {
        self.response
            .as_ref()
            .and_then(|r| parse_status_line(&r.status))
            .unwrap_or(0)
    }

    /// Diagnostics of a failed entry.
    pub fn diagnostics(&self) -> String {
        self.response
            .as_ref()
            .and_then(|r| r.outcome.as_ref())
            .or(self.resource.as_ref())
            .map(operation_outcome_diagnostics)
            .unwrap_or_default()
    }
}

/// Leading status code of a status line such as `201 Created`.
pub fn parse_status_line(status: &str) -> Option<u16> {
    status.split_whitespace().next()?.parse().ok()
}

/// Concatenated `issue[].diagnostics` (or `details.text`) of an `OperationOutcome`.
///
/// # Examples
///
/// ```
/// use cohort_core::operation_outcome_diagnostics;
/// use serde_json::json;
///
/// let outcome = json!({
///     "resourceType": "OperationOutcome",
///     "issue": [{"severity": "error", "diagnostics": "Unknown search parameter \"_elements\""}]
/// });
/// assert!(operation_outcome_diagnostics(&outcome).contains("_elements"));
/// ```
pub fn operation_outcome_diagnostics(outcome: &JsonValue) -> String {
    let Some(issues) = outcome.get("issue").and_then(JsonValue::as_array) else {
        return match outcome {
            JsonValue::String(s) => s.clone(),
            _ => String::new(),
        };
    };
    issues
        .iter()
        .filter_map(|issue| {
            issue
                .get("diagnostics")
                .and_then(JsonValue::as_str)
                .or_else(|| {
                    issue
                        .get("details")
                        .and_then(|d| d.get("text"))
                        .and_then(JsonValue::as_str)
                })
        })
        .collect::<Vec<_>>()
        .join("; ")
}
