//! `cohort count`: paged map-filter over search results.

use cohort::{CohortConfig, CohortResult, FhirClient, MapOutcome};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Keep resources from `resource` that carry `field`, up to `limit`.
pub async fn count_resources(
    config: &CohortConfig,
    server: &str,
    resource: &str,
    limit: usize,
    field: &str,
    page_size: usize,
) -> CohortResult<()> {
    let client = FhirClient::from_config(server, config)?;
    let field: Arc<str> = Arc::from(field);

    let handle = client.resources_map_filter(
        resource,
        limit,
        move |item: JsonValue| {
            let field = Arc::clone(&field);
            async move { MapOutcome::from(item.get(field.as_ref()).is_some()) }
        },
        page_size,
    );
    let result = handle.result().await?;

    match result.total {
        Some(total) => println!("kept {} of {} matches", result.items.len(), total),
        None => println!("kept {}", result.items.len()),
    }
    Ok(())
}
