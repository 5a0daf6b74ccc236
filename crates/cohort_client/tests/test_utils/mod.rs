//! Test utilities for the request client.

pub mod mock_transport;

#[allow(unused_imports)]
pub use mock_transport::{MockReply, MockTransport, RecordedCall, batch_entries, echo};

use cohort_cache::ResponseCache;
use cohort_client::{FhirClient, Transport};
use cohort_core::CohortConfig;
use std::sync::Arc;

/// Base URL every test client points at.
pub const BASE: &str = "https://fhir.test/r4";

/// Client over `transport` with default configuration and an in-memory cache.
#[allow(dead_code)]
pub fn client_with(transport: Arc<MockTransport>) -> FhirClient {
    client_with_config(transport, CohortConfig::default())
}

/// Client over `transport` with an explicit configuration.
#[allow(dead_code)]
pub fn client_with_config(transport: Arc<MockTransport>, config: CohortConfig) -> FhirClient {
    let transport: Arc<dyn Transport> = transport;
    FhirClient::new(BASE, &config, transport, ResponseCache::in_memory())
        .expect("Failed to build test client")
}
