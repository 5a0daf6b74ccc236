//! Feature probes issued during negotiation.
//!
//! A probe is a small request whose success tells whether the server
//! supports a feature. A failed probe means the feature is absent; it never
//! fails the negotiation.

use cohort_client::FhirClient;
use cohort_core::{
    BatchBundle, BatchResponseBundle, CacheOptions, CancellationToken, FeatureValue, Method,
    RequestOptions, features::names,
};
use futures::future::join_all;
use serde_json::Value as JsonValue;
use tracing::debug;

/// Lifetime of cached probe results.
pub(crate) const PROBE_CACHE_SECONDS: u64 = 24 * 60 * 60;

/// Resource types whose read access is recorded as `canRead<Type>`.
pub(crate) const READABLE_TYPES: [&str; 5] = [
    "Observation",
    "Condition",
    "Encounter",
    "MedicationRequest",
    "Procedure",
];

/// Results of the probes every context runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CoreProbes {
    pub(crate) has_patients: bool,
    pub(crate) has_missing_modifier: bool,
    pub(crate) has_batch_support: bool,
}

impl CoreProbes {
    pub(crate) fn features(&self) -> Vec<(String, FeatureValue)> {
        vec![
            (names::HAS_PATIENTS.to_string(), self.has_patients.into()),
            (names::HAS_MISSING_MODIFIER.to_string(), self.has_missing_modifier.into()),
            (names::HAS_BATCH_SUPPORT.to_string(), self.has_batch_support.into()),
        ]
    }
}

/// Issues the probes of one negotiation run.
pub(crate) struct Prober<'a> {
    client: &'a FhirClient,
    cache_name: String,
    cancel: CancellationToken,
}

impl<'a> Prober<'a> {
    pub(crate) fn new(client: &'a FhirClient, server_url: &str, cancel: CancellationToken) -> Self {
        Self {
            client,
            cache_name: format!("probes-{}", server_url),
            cancel,
        }
    }

    fn request_options(&self, combinable: bool) -> RequestOptions {
        RequestOptions::default()
            .with_combinable(combinable)
            .with_cancel(self.cancel.clone())
    }

    fn cache_options(&self, combinable: bool) -> CacheOptions {
        CacheOptions::named(self.cache_name.clone())
            .with_expiration_seconds(Some(PROBE_CACHE_SECONDS))
            .with_cache_errors(true)
            .with_request(self.request_options(combinable))
    }

    async fn succeeds(&self, url: &str, combinable: bool) -> bool {
        match self
            .client
            .get_with_cache(url, &self.cache_options(combinable))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(url, status = e.status, "Probe failed");
                false
            }
        }
    }

    async fn count(&self, url: &str, combinable: bool) -> Option<u64> {
        match self
            .client
            .get_with_cache(url, &self.cache_options(combinable))
            .await
        {
            Ok(response) => response.total(),
            Err(e) => {
                debug!(url, status = e.status, "Count probe failed");
                None
            }
        }
    }

    /// POST a one-entry batch and check the server answers with a batch response.
    async fn batch_support(&self) -> bool {
        let Ok(body) = serde_json::to_value(BatchBundle::of_gets(["Patient?_count=1"])) else {
            return false;
        };
        let response = match self
            .client
            .request(Method::Post, "", Some(body), &self.request_options(false))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(status = e.status, "Batch probe failed");
                return false;
            }
        };

        let is_batch_response =
            response.data.get("type").and_then(JsonValue::as_str) == Some("batch-response");
        let first_entry_ok = serde_json::from_value::<BatchResponseBundle>(response.data)
            .ok()
            .and_then(|bundle| bundle.entry.first().map(|entry| entry.status_code()))
            .is_some_and(|status| (200..300).contains(&status));
        is_batch_response && first_entry_ok
    }

    /// Probes that need no elevated access, run in parallel and unbatched.
    pub(crate) async fn probe_core(&self) -> CoreProbes {
        let (has_patients, has_missing_modifier, has_batch_support) = tokio::join!(
            self.succeeds("Patient?_count=1", false),
            self.succeeds("Patient?birthdate:missing=false&_count=1", false),
            self.batch_support(),
        );
        CoreProbes {
            has_patients,
            has_missing_modifier,
            has_batch_support,
        }
    }

    /// Probes of the full context.
    pub(crate) async fn probe_full(&self, core: &CoreProbes) -> Vec<(String, FeatureValue)> {
        let combinable = core.has_batch_support;
        let (sort_by_date, sort_by_secondary_key, lookup, reliable_counts, readable) = tokio::join!(
            self.succeeds("Observation?_sort=-date&_count=1", combinable),
            self.succeeds("Patient?_sort=birthdate,_id&_count=1", combinable),
            self.succeeds(
                "CodeSystem/$lookup?system=http://loinc.org&code=8867-4",
                combinable
            ),
            self.missing_counts_are_reliable(core.has_missing_modifier, combinable),
            join_all(READABLE_TYPES.iter().map(|resource_type| async move {
                let url = format!("{}?_count=1", resource_type);
                (*resource_type, self.succeeds(&url, combinable).await)
            })),
        );

        let mut features = vec![
            (names::HAS_SORT_BY_DATE.to_string(), sort_by_date.into()),
            (
                names::HAS_SORT_BY_SECONDARY_KEY.to_string(),
                sort_by_secondary_key.into(),
            ),
            (names::HAS_LOOKUP_OPERATION.to_string(), lookup.into()),
            (
                names::HAS_RELIABLE_MISSING_COUNTS.to_string(),
                reliable_counts.into(),
            ),
        ];
        features.extend(readable.into_iter().map(|(resource_type, readable)| {
            (
                format!("{}{}", names::CAN_READ_PREFIX, resource_type),
                readable.into(),
            )
        }));
        features
    }

    /// Whether `:missing=true` and `:missing=false` counts add up to the total.
    ///
    /// Some servers count `:missing` wrongly; this compares the three counts.
    /// Without the modifier, or when any count is unavailable, the counts are
    /// treated as unreliable. An empty server has nothing to disagree on.
    pub(crate) async fn missing_counts_are_reliable(
        &self,
        has_missing_modifier: bool,
        combinable: bool,
    ) -> bool {
        if !has_missing_modifier {
            return false;
        }
        let Some(total) = self.count("Patient?_summary=count", combinable).await else {
            return false;
        };
        if total == 0 {
            return true;
        }
        let Some(missing) = self
            .count("Patient?birthdate:missing=true&_summary=count", combinable)
            .await
        else {
            return false;
        };
        if missing > total {
            return false;
        }
        let Some(present) = self
            .count("Patient?birthdate:missing=false&_summary=count", combinable)
            .await
        else {
            return false;
        };
        missing + present == total
    }
}
