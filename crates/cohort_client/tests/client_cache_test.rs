//! `get_with_cache` behaviour of the request client.

mod test_utils;

use cohort_core::CacheOptions;
use cohort_error::RequestErrorKind;
use serde_json::json;
use test_utils::{MockReply, MockTransport, client_with};

fn not_found() -> MockReply {
    MockReply::json(
        404,
        json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "Unknown resource type"}]
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_network() -> anyhow::Result<()> {
    let transport = MockTransport::echoing();
    let client = client_with(transport.clone());
    let options = CacheOptions::named("probes").with_expiration_seconds(Some(3600));

    let first = client.get_with_cache("metadata", &options).await?;
    let second = client.get_with_cache("metadata", &options).await?;

    assert_eq!(first, second);
    assert_eq!(transport.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_and_named_caches_are_separate() -> anyhow::Result<()> {
    let transport = MockTransport::echoing();
    let client = client_with(transport.clone());

    client.get_with_cache("metadata", &CacheOptions::default()).await?;
    client
        .get_with_cache("metadata", &CacheOptions::named("probes"))
        .await?;
    client.get_with_cache("metadata", &CacheOptions::default()).await?;

    assert_eq!(transport.call_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_errors_are_cached_only_on_request() {
    let transport = MockTransport::new(|_, _| not_found());
    let client = client_with(transport.clone());
    let remembering = CacheOptions::named("probes").with_cache_errors(true);
    let forgetting = CacheOptions::named("other");

    let first = client.get_with_cache("Unknown", &remembering).await.unwrap_err();
    let cached = client.get_with_cache("Unknown", &remembering).await.unwrap_err();
    assert_eq!(transport.call_count(), 1);
    assert_eq!(first.status, 404);
    assert_eq!(cached.kind, RequestErrorKind::Http(404));
    assert_eq!(cached.message, "Unknown resource type");

    client.get_with_cache("Unknown", &forgetting).await.unwrap_err();
    client.get_with_cache("Unknown", &forgetting).await.unwrap_err();
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failures_are_never_cached() {
    let transport = MockTransport::new(|_, _| MockReply::json(401, json!({})));
    let client = client_with(transport.clone());
    let options = CacheOptions::named("probes").with_cache_errors(true);

    client.get_with_cache("metadata", &options).await.unwrap_err();
    client.get_with_cache("metadata", &options).await.unwrap_err();

    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clearing_caches_forces_refetch() -> anyhow::Result<()> {
    let transport = MockTransport::echoing();
    let client = client_with(transport.clone());
    let named = CacheOptions::named("probes");
    let anonymous = CacheOptions::default();

    client.get_with_cache("metadata", &named).await?;
    client.clear_cache("probes").await?;
    client.get_with_cache("metadata", &named).await?;
    assert_eq!(transport.call_count(), 2);

    client.get_with_cache("Patient", &anonymous).await?;
    client.clear_all_caches().await?;
    client.get_with_cache("Patient", &anonymous).await?;
    client.get_with_cache("metadata", &named).await?;
    assert_eq!(transport.call_count(), 5);
    Ok(())
}
