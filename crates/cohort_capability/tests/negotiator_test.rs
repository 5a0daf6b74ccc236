//! Capability negotiation against a routed mock server.

mod test_utils;

use cohort_capability::{CapabilityNegotiator, NegotiationContext};
use cohort_core::{Method, features::names};
use cohort_error::NegotiationErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use test_utils::{
    FhirServerMock, Reply, SERVER_A, SERVER_B, capable_server, client_for, searchset,
};

#[tokio::test(start_paused = true)]
async fn test_full_negotiation_publishes_features() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let features = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;

    assert_eq!(features.version_name(), Some("R4"));
    assert_eq!(features.text(names::FHIR_VERSION), Some("4.0.1"));
    assert_eq!(
        features.text(names::SOFTWARE_NAME),
        Some("Server at https://a.test/fhir")
    );
    for flag in [
        names::HAS_PATIENTS,
        names::HAS_MISSING_MODIFIER,
        names::HAS_BATCH_SUPPORT,
        names::HAS_SORT_BY_DATE,
        names::HAS_SORT_BY_SECONDARY_KEY,
        names::HAS_LOOKUP_OPERATION,
        names::HAS_RELIABLE_MISSING_COUNTS,
        "canReadObservation",
        "canReadProcedure",
    ] {
        assert!(features.flag(flag), "{} should be set", flag);
    }

    assert_eq!(negotiator.features(), Some(features));
    assert_eq!(negotiator.version_name().as_deref(), Some("R4"));
    assert!(negotiator.client().tunables().batching_enabled);
    assert_eq!(
        server.metadata_calls(SERVER_A),
        vec!["metadata?_elements=fhirVersion,software&_format=json"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_conditional_probes_are_batched_when_supported() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;

    let batched: Vec<String> = server
        .seen()
        .into_iter()
        .flat_map(|seen| seen.entries)
        .collect();
    assert!(batched.iter().any(|path| path == "Observation?_sort=-date&_count=1"));
    assert!(batched.iter().any(|path| path == "Condition?_count=1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_version_fails() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("0.5.0"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let err = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();

    assert!(matches!(&err.kind, NegotiationErrorKind::UnsupportedVersion(v) if v == "0.5.0"));
    assert_eq!(negotiator.features(), None);
    assert_eq!(server.seen().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auth_challenges_are_classified() -> anyhow::Result<()> {
    let basic = FhirServerMock::new(|_: &str, _: &str| Reply::unauthorized("Basic realm=\"fhir\""));
    let bearer = FhirServerMock::new(|_: &str, _: &str| {
        Reply::unauthorized("Bearer realm=\"fhir\", error=\"invalid_token\"")
    });
    let no_challenge = FhirServerMock::new(|_: &str, _: &str| Reply::status(401, serde_json::Value::Null));

    let err = CapabilityNegotiator::new(client_for(basic))
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, NegotiationErrorKind::BasicAuthRequired));

    let err = CapabilityNegotiator::new(client_for(bearer))
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, NegotiationErrorKind::OAuth2Required));

    let err = CapabilityNegotiator::new(client_for(no_challenge))
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();
    assert!(matches!(&err.kind, NegotiationErrorKind::Request(e) if e.status == 401));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rejected_elements_parameter_is_dropped() -> anyhow::Result<()> {
    let capable = capable_server("4.0.1");
    let server = FhirServerMock::new(move |base: &str, path: &str| {
        if path.starts_with("metadata") && path.contains("_elements") {
            return Reply::bad_request("Unknown search parameter _elements");
        }
        capable(base, path)
    });
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    negotiator
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;

    assert_eq!(
        server.metadata_calls(SERVER_A),
        vec![
            "metadata?_elements=fhirVersion,software&_format=json",
            "metadata?_format=json",
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_metadata_fallback_stops_after_three_attempts() -> anyhow::Result<()> {
    let capable = capable_server("4.0.1");
    let server = FhirServerMock::new(move |base: &str, path: &str| {
        if path.starts_with("metadata") && path.contains("_elements") {
            return Reply::bad_request("Unknown search parameter _elements");
        }
        if path.starts_with("metadata") && path.contains("_format") {
            return Reply::bad_request("_format is not supported");
        }
        capable(base, path)
    });
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    negotiator
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;

    assert_eq!(
        server.metadata_calls(SERVER_A),
        vec![
            "metadata?_elements=fhirVersion,software&_format=json",
            "metadata?_format=json",
            "metadata",
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_bad_request_naming_no_parameter_fails() -> anyhow::Result<()> {
    let server = FhirServerMock::new(|_: &str, _: &str| Reply::bad_request("Malformed request"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let err = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();

    assert!(matches!(&err.kind, NegotiationErrorKind::Request(e) if e.status == 400));
    assert_eq!(server.metadata_calls(SERVER_A).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_restricted_context_runs_core_probes_only() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let features = negotiator
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;

    assert!(features.flag(names::HAS_PATIENTS));
    assert!(features.flag(names::HAS_BATCH_SUPPORT));
    assert_eq!(features.get(names::HAS_SORT_BY_DATE), None);
    assert_eq!(features.get("canReadObservation"), None);
    assert!(
        server
            .paths(SERVER_A)
            .iter()
            .all(|path| !path.contains("_sort") && !path.contains("$lookup"))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_batch_support_disables_batching() -> anyhow::Result<()> {
    let server = FhirServerMock::without_batch(capable_server("3.0.2"), &[SERVER_A]);
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let features = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;

    assert_eq!(features.version_name(), Some("STU3"));
    assert!(!features.flag(names::HAS_BATCH_SUPPORT));
    assert!(features.flag(names::HAS_SORT_BY_DATE));
    assert!(!negotiator.client().tunables().batching_enabled);

    let posts = server
        .seen()
        .into_iter()
        .filter(|seen| seen.method == Method::Post)
        .count();
    assert_eq!(posts, 1, "only the batch probe itself is a POST");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_run() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let (first, second) = tokio::join!(
        negotiator.initialize(SERVER_A, NegotiationContext::Full),
        negotiator.initialize(SERVER_A, NegotiationContext::Full),
    );
    assert_eq!(first?, second?);

    negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;
    assert_eq!(server.metadata_calls(SERVER_A).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_negotiation_is_not_remembered() -> anyhow::Result<()> {
    let capable = capable_server("4.0.1");
    let metadata_seen = AtomicUsize::new(0);
    let server = FhirServerMock::new(move |base: &str, path: &str| {
        if path.starts_with("metadata") && metadata_seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return Reply::status(503, serde_json::Value::Null);
        }
        capable(base, path)
    });
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let err = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await
        .unwrap_err();
    assert!(matches!(&err.kind, NegotiationErrorKind::Request(e) if e.status == 503));

    let features = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;

    assert_eq!(features.version_name(), Some("R4"));
    assert_eq!(server.metadata_calls(SERVER_A).len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_switching_server_outdates_previous_run() -> anyhow::Result<()> {
    let capable = capable_server("4.0.1");
    let server = FhirServerMock::new(move |base: &str, path: &str| {
        let reply = capable(base, path);
        if base == SERVER_A && path.starts_with("metadata") {
            return reply.after(Duration::from_millis(500));
        }
        reply
    });
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let stale = tokio::spawn({
        let negotiator = negotiator.clone();
        async move {
            negotiator
                .initialize(SERVER_A, NegotiationContext::Full)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let features = negotiator
        .initialize(SERVER_B, NegotiationContext::Full)
        .await?;
    let err = stale.await?.unwrap_err();

    assert!(err.is_outdated());
    assert_eq!(
        features.text(names::SOFTWARE_NAME),
        Some("Server at https://b.test/fhir")
    );
    assert_eq!(negotiator.features(), Some(features));
    assert_eq!(negotiator.client().server_url(), SERVER_B);
    assert_eq!(server.metadata_calls(SERVER_B).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_changing_context_renegotiates() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let negotiator = CapabilityNegotiator::new(client_for(server.clone()));

    let restricted = negotiator
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;
    let full = negotiator
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;

    assert_eq!(restricted.get(names::HAS_LOOKUP_OPERATION), None);
    assert!(full.flag(names::HAS_LOOKUP_OPERATION));
    assert_eq!(server.metadata_calls(SERVER_A).len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_probe_results_are_cached_per_server() -> anyhow::Result<()> {
    let server = FhirServerMock::new(capable_server("4.0.1"));
    let client = client_for(server.clone());

    CapabilityNegotiator::new(client.clone())
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;
    CapabilityNegotiator::new(client)
        .initialize(SERVER_A, NegotiationContext::Restricted)
        .await?;

    let patient_probes = server
        .seen()
        .into_iter()
        .filter(|seen| seen.method == Method::Get && seen.path == "Patient?_count=1")
        .count();
    assert_eq!(patient_probes, 1);
    assert_eq!(server.metadata_calls(SERVER_A).len(), 2);
    Ok(())
}

fn counting_server(
    total: Option<u64>,
    missing: u64,
    present: u64,
) -> impl Fn(&str, &str) -> Reply + Send + Sync {
    let capable = capable_server("4.0.1");
    move |base: &str, path: &str| match path {
        "Patient?_summary=count" => match total {
            Some(total) => Reply::ok(searchset(total)),
            None => Reply::bad_request("_summary is not supported"),
        },
        "Patient?birthdate:missing=true&_summary=count" => Reply::ok(searchset(missing)),
        "Patient?birthdate:missing=false&_summary=count" => Reply::ok(searchset(present)),
        _ => capable(base, path),
    }
}

async fn reliable_counts(total: Option<u64>, missing: u64, present: u64) -> anyhow::Result<bool> {
    let server = FhirServerMock::new(counting_server(total, missing, present));
    let features = CapabilityNegotiator::new(client_for(server))
        .initialize(SERVER_A, NegotiationContext::Full)
        .await?;
    Ok(features.flag(names::HAS_RELIABLE_MISSING_COUNTS))
}

#[tokio::test(start_paused = true)]
async fn test_missing_counts_must_add_up() -> anyhow::Result<()> {
    assert!(reliable_counts(Some(10), 3, 7).await?);
    assert!(!reliable_counts(Some(10), 3, 5).await?);
    assert!(!reliable_counts(Some(10), 12, 0).await?);
    assert!(!reliable_counts(None, 3, 7).await?);
    assert!(reliable_counts(Some(0), 4, 4).await?);
    Ok(())
}
