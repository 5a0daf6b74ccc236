//! Test utilities for capability negotiation.

pub mod fhir_server;

#[allow(unused_imports)]
pub use fhir_server::{FhirServerMock, Reply, capable_server, searchset};

use cohort_cache::ResponseCache;
use cohort_client::{FhirClient, Transport};
use cohort_core::CohortConfig;
use std::sync::Arc;

/// First test server.
pub const SERVER_A: &str = "https://a.test/fhir";

/// Second test server.
#[allow(dead_code)]
pub const SERVER_B: &str = "https://b.test/fhir";

/// Client over `server` pointed at [`SERVER_A`], with an in-memory cache.
pub fn client_for(server: Arc<FhirServerMock>) -> FhirClient {
    let transport: Arc<dyn Transport> = server;
    FhirClient::new(
        SERVER_A,
        &CohortConfig::default(),
        transport,
        ResponseCache::in_memory(),
    )
    .expect("Failed to build test client")
}
