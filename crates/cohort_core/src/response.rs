//! Successful responses and the FHIR search-set helpers callers need.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A resolved request: HTTP status and parsed JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhirResponse {
    /// HTTP status (2xx for resolved requests)
    pub status: u16,
    /// Parsed body, `Null` when the server sent none
    pub data: JsonValue,
}

impl FhirResponse {
    /// Create a response.
    pub fn new(status: u16, data: JsonValue) -> Self {
        Self { status, data }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// URL of the `link` entry with `relation == "next"`, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use cohort_core::FhirResponse;
    /// use serde_json::json;
    ///
    /// let page = FhirResponse::new(200, json!({
    ///     "resourceType": "Bundle",
    ///     "link": [
    ///         {"relation": "self", "url": "https://example.org/fhir/Patient"},
    ///         {"relation": "next", "url": "https://example.org/fhir/Patient?page=2"}
    ///     ]
    /// }));
    /// assert_eq!(page.next_link(), Some("https://example.org/fhir/Patient?page=2"));
    /// ```
    pub fn next_link(&self) -> Option<&str> {
        self.data
            .get("link")?
            .as_array()?
            .iter()
            .find(|link| link.get("relation").and_then(JsonValue::as_str) == Some("next"))?
            .get("url")?
            .as_str()
    }

    /// The search-set `total`, when the server reported one.
    pub fn total(&self) -> Option<u64> {
        self.data.get("total")?.as_u64()
    }

    /// The `entry` array of a bundle, empty when absent.
    pub fn entries(&self) -> &[JsonValue] {
        self.data
            .get("entry")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
