//! Cohort - batched, cached, rate-adaptive FHIR request client
//!
//! Cohort sits between an application and a FHIR REST server. Every request
//! goes through one scheduler that merges small GETs into `batch` bundles,
//! caps concurrency, paces dispatches when the server advertises a rate
//! limit, and retries rate-limited or prematurely aborted requests.
//!
//! # Features
//!
//! - **Batching**: combinable GETs are merged into batch bundles after a short debounce
//! - **Retry**: `Retry-After` aware retry with a give-up window
//! - **Pacing**: adapts to `x-ratelimit-limit` headers
//! - **Caching**: in-memory and named durable response caches with expiry
//! - **Capability negotiation**: learns what each server supports
//! - **Paged map-filter**: walks search result pages until enough items are kept
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cohort::{CapabilityNegotiator, CohortConfig, FhirClient, NegotiationContext, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = "https://hapi.fhir.org/baseR4";
//!     let client = FhirClient::from_config(server, &CohortConfig::load()?)?;
//!
//!     let negotiator = CapabilityNegotiator::new(client.clone());
//!     let features = negotiator.initialize(server, NegotiationContext::Full).await?;
//!     println!("{:?}", features.version_name());
//!
//!     let patients = client.get("Patient?_count=10", &RequestOptions::default()).await?;
//!     println!("{}", patients.data);
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `observability` - OpenTelemetry span export to stdout
//!
//! # Architecture
//!
//! - `cohort_error` - Error types
//! - `cohort_core` - Shared data types and configuration
//! - `cohort_cache` - Response cache and its stores
//! - `cohort_rate_limit` - Retry policy and pacing
//! - `cohort_client` - Scheduler, batch dispatcher, client and map-filter
//! - `cohort_capability` - Capability negotiation
//!
//! This crate re-exports everything for convenience.

pub use cohort_cache::*;
pub use cohort_capability::*;
pub use cohort_client::*;
pub use cohort_core::*;
pub use cohort_error::*;
pub use cohort_rate_limit::*;

mod logging;

pub use logging::{LogFormat, LoggingConfig, init_logging};

#[cfg(feature = "observability")]
mod observability;

#[cfg(feature = "observability")]
pub use observability::init_observability;
