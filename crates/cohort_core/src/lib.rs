//! Core data types for the Cohort FHIR request client.
//!
//! These types are shared by the cache, retry policy, scheduler and
//! capability negotiator, and form the vocabulary of the collaborator-facing
//! surface.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bundle;
mod config;
mod event;
pub mod features;
mod request;
mod response;

pub use bundle::{
    BatchBundle, BatchEntry, BatchEntryRequest, BatchEntryResponse, BatchResponseBundle,
    BatchResponseEntry, operation_outcome_diagnostics, parse_status_line,
};
pub use config::{
    CacheConfig, CacheConfigBuilder, ClientConfig, ClientConfigBuilder, CohortConfig,
    RetryConfig, RetryConfigBuilder,
};
pub use event::ClientEvent;
pub use features::{FeatureValue, ServerFeatures};
pub use request::{CacheOptions, FHIR_JSON, Method, Priority, RequestOptions, RetryBudget};
pub use response::FhirResponse;
pub use tokio_util::sync::CancellationToken;
