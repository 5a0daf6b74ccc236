//! `cohort probe`: capability negotiation.

use cohort::{CapabilityNegotiator, CohortConfig, CohortResult, FhirClient, NegotiationContext};
use tracing::info;

/// Negotiate with `server` and print its features as JSON.
pub async fn probe_server(config: &CohortConfig, server: &str, restricted: bool) -> CohortResult<()> {
    let context = if restricted {
        NegotiationContext::Restricted
    } else {
        NegotiationContext::Full
    };
    let client = FhirClient::from_config(server, config)?;
    let negotiator = CapabilityNegotiator::new(client);

    let features = negotiator.initialize(server, context).await?;
    info!(version = ?features.version_name(), %context, "Negotiated");

    println!("{:#}", features.to_json());
    Ok(())
}
