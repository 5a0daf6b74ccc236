//! `cohort get`: one request through the cache.

use cohort::{CacheOptions, CohortConfig, CohortResult, FhirClient};

/// GET `path` from `server` and print the response body.
pub async fn fetch(
    config: &CohortConfig,
    server: &str,
    path: &str,
    cache: Option<&str>,
) -> CohortResult<()> {
    let client = FhirClient::from_config(server, config)?;
    let options = match cache {
        Some(name) => CacheOptions::named(name),
        None => CacheOptions::default(),
    };

    let response = client.get_with_cache(path, &options).await?;
    println!("{:#}", response.data);
    Ok(())
}
