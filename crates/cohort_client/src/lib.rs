//! Batched, cached, rate-adaptive request client for FHIR servers.
//!
//! Every network call goes through one scheduler task:
//!
//! - requests wait in a priority queue (FIFO within a priority),
//! - combinable GETs are merged into `batch` bundles after a short debounce,
//! - at most `max_active_requests` calls are in flight, spaced by the pacing
//!   interval the [`RetryPolicy`](cohort_rate_limit::RetryPolicy) derives from
//!   rate-limit headers,
//! - transient failures are requeued at the head after a backoff.
//!
//! [`FhirClient`] is the surface callers use; [`Transport`] is the network
//! seam underneath it.

#![warn(missing_docs)]

mod client;
mod dispatch;
mod map_filter;
mod pending;
mod scheduler;
mod transport;
mod url;

pub use client::FhirClient;
pub use map_filter::{MapFilterHandle, MapFilterResult, MapOutcome, PagedMapFilter};
pub use scheduler::Tunables;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use url::{append_query, relative_url, resolve_url};
