//! Request descriptors shared by the scheduler and its callers.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// HTTP method of a logical request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read
    Get,
    /// Create or search by body
    Post,
    /// Update
    Put,
    /// Delete
    Delete,
}

/// Dispatch priority. Higher priorities leave the queue first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work such as prefetching
    Low,
    /// Interactive requests
    #[default]
    Normal,
}

/// How many more times a request may be retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryBudget {
    /// Retry until the give-up window closes
    #[default]
    Unbounded,
    /// Retry at most this many more times
    Limited(u32),
}

impl RetryBudget {
    /// Whether another attempt is allowed.
    pub fn allows_retry(&self) -> bool {
        match self {
            RetryBudget::Unbounded => true,
            RetryBudget::Limited(n) => *n > 0,
        }
    }

    /// Budget left after spending one retry.
    pub fn spend(self) -> Self {
        match self {
            RetryBudget::Unbounded => RetryBudget::Unbounded,
            RetryBudget::Limited(n) => RetryBudget::Limited(n.saturating_sub(1)),
        }
    }
}

/// Per-call options for `get` and `request`.
///
/// # Examples
///
/// ```
/// use cohort_core::{Priority, RequestOptions, RetryBudget};
///
/// let options = RequestOptions::default()
///     .with_priority(Priority::Low)
///     .with_retries(Some(RetryBudget::Limited(2)));
/// assert_eq!(*options.priority(), Priority::Low);
/// assert!(*options.combinable());
/// ```
#[derive(Debug, Clone, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct RequestOptions {
    /// Dispatch priority
    priority: Priority,
    /// Whether a GET may be merged into a batch bundle
    combinable: bool,
    /// Retry budget; `None` uses the configured default
    retries: Option<RetryBudget>,
    /// External cancellation token
    #[setters(strip_option)]
    cancel: Option<CancellationToken>,
    /// Content type sent with a request body
    content_type: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            combinable: true,
            retries: None,
            cancel: None,
            content_type: FHIR_JSON.to_string(),
        }
    }
}

/// Media type of FHIR JSON payloads.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Options for `get_with_cache`.
///
/// # Examples
///
/// ```
/// use cohort_core::CacheOptions;
///
/// let options = CacheOptions::named("probes-https://hapi.fhir.org/baseR4")
///     .with_expiration_seconds(Some(3600))
///     .with_cache_errors(true);
/// assert_eq!(options.cache_name().as_deref(), Some("probes-https://hapi.fhir.org/baseR4"));
/// ```
#[derive(Debug, Clone, Default, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct CacheOptions {
    /// Durable cache name; `None` uses the in-memory cache
    cache_name: Option<String>,
    /// Lifetime of the stored entry; `None` never expires
    expiration_seconds: Option<u64>,
    /// Also remember non-2xx responses
    cache_errors: bool,
    /// Options of the underlying request on a miss
    request: RequestOptions,
}

impl CacheOptions {
    /// Options targeting a named durable cache.
    pub fn named(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: Some(cache_name.into()),
            ..Self::default()
        }
    }
}
