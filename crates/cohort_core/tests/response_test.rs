//! Tests for response and batch bundle helpers.

use cohort_core::{BatchResponseBundle, FhirResponse, RetryBudget, ServerFeatures};
use serde_json::json;

#[test]
fn test_last_page_has_no_next_link() {
    let page = FhirResponse::new(
        200,
        json!({"resourceType": "Bundle", "link": [{"relation": "self", "url": "x"}], "entry": []}),
    );
    assert_eq!(page.next_link(), None);
    assert!(page.entries().is_empty());
    assert_eq!(page.total(), None);
}

#[test]
fn test_batch_response_entries_map_status_and_diagnostics() {
    let bundle: BatchResponseBundle = serde_json::from_value(json!({
        "resourceType": "Bundle",
        "type": "batch-response",
        "entry": [
            {"resource": {"resourceType": "Patient", "id": "1"}, "response": {"status": "200 OK"}},
            {"response": {"status": "404", "outcome": {
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "diagnostics": "Resource Patient/2 is not known"}]
            }}},
            {}
        ]
    }))
    .unwrap();

    assert_eq!(bundle.entry[0].status_code(), 200);
    assert_eq!(bundle.entry[1].status_code(), 404);
    assert!(bundle.entry[1].diagnostics().contains("Patient/2"));
    assert_eq!(bundle.entry[2].status_code(), 0);
}

#[test]
fn test_retry_budget_spending() {
    let budget = RetryBudget::Limited(1);
    assert!(budget.allows_retry());
    let spent = budget.spend();
    assert!(!spent.allows_retry());
    assert_eq!(spent.spend(), RetryBudget::Limited(0));
    assert!(RetryBudget::Unbounded.spend().allows_retry());
}

#[test]
fn test_features_serialize_flat() {
    let features: ServerFeatures = serde_json::from_value(json!({
        "versionName": "R4",
        "hasBatchSupport": true
    }))
    .unwrap();
    assert_eq!(features.version_name(), Some("R4"));
    assert!(features.flag("hasBatchSupport"));
    assert_eq!(serde_json::to_value(&features).unwrap()["hasBatchSupport"], true);
}
