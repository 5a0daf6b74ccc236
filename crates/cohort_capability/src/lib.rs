//! Capability negotiation for the Cohort request client.
//!
//! [`CapabilityNegotiator`] runs a fixed sequence of probe requests through a
//! [`FhirClient`](cohort_client::FhirClient) to learn the server's FHIR
//! release and which optional behaviour it supports, and publishes the
//! result as [`ServerFeatures`](cohort_core::ServerFeatures).

#![warn(missing_docs)]

mod context;
mod negotiator;
mod probes;
mod version;

pub use context::NegotiationContext;
pub use negotiator::CapabilityNegotiator;
pub use version::version_name;
