//! Tests for retry classification, the give-up window and pacing.

use cohort_core::{RetryBudget, RetryConfig};
use cohort_rate_limit::{FailedAttempt, RetryDecision, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use std::time::Duration;
use tokio::time::Instant;

fn attempt(status: u16, elapsed_ms: u64) -> FailedAttempt<'static> {
    FailedAttempt {
        status,
        caller_cancelled: false,
        elapsed: Duration::from_millis(elapsed_ms),
        budget: RetryBudget::Unbounded,
        first_failure: Instant::now(),
        headers: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_too_many_requests_is_retried_with_default_delay() {
    let policy = RetryPolicy::new(RetryConfig::default());

    let decision = policy.decide(&attempt(429, 100));

    assert_eq!(
        decision,
        RetryDecision::Retry {
            delay: Duration::from_millis(1000)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_seconds_is_honoured() {
    let policy = RetryPolicy::new(RetryConfig::default());
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));

    let decision = policy.decide(&FailedAttempt {
        headers: Some(&headers),
        ..attempt(429, 100)
    });

    assert_eq!(
        decision,
        RetryDecision::Retry {
            delay: Duration::from_secs(2)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_definite_errors_are_not_retried() {
    let policy = RetryPolicy::new(RetryConfig::default());

    for status in [400, 401, 403, 404, 500, 503] {
        assert_eq!(policy.decide(&attempt(status, 100)), RetryDecision::GiveUp);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fast_abort_is_retried_slow_abort_is_not() {
    let policy = RetryPolicy::new(RetryConfig::default());

    assert!(matches!(
        policy.decide(&attempt(0, 200)),
        RetryDecision::Retry { .. }
    ));
    assert_eq!(policy.decide(&attempt(0, 20_000)), RetryDecision::GiveUp);
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_is_never_retried() {
    let policy = RetryPolicy::new(RetryConfig::default());

    let decision = policy.decide(&FailedAttempt {
        caller_cancelled: true,
        ..attempt(0, 10)
    });

    assert_eq!(decision, RetryDecision::GiveUp);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_gives_up() {
    let policy = RetryPolicy::new(RetryConfig::default());
    let budget = RetryBudget::Limited(1);

    let first = policy.decide(&FailedAttempt {
        budget,
        ..attempt(429, 10)
    });
    let second = policy.decide(&FailedAttempt {
        budget: budget.spend(),
        ..attempt(429, 10)
    });

    assert!(matches!(first, RetryDecision::Retry { .. }));
    assert_eq!(second, RetryDecision::GiveUp);
}

#[tokio::test(start_paused = true)]
async fn test_give_up_window_closes_without_success() {
    let policy = RetryPolicy::new(RetryConfig::default());
    let failing = attempt(429, 10);

    assert!(matches!(policy.decide(&failing), RetryDecision::Retry { .. }));
    tokio::time::advance(Duration::from_secs(91)).await;
    assert_eq!(policy.decide(&failing), RetryDecision::GiveUp);

    policy.record_success();
    assert!(matches!(policy.decide(&failing), RetryDecision::Retry { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_idle_policy_retries_first_failure() {
    let policy = RetryPolicy::new(RetryConfig::default());

    tokio::time::advance(Duration::from_secs(120)).await;

    assert!(policy.since_last_success() >= Duration::from_secs(120));
    assert!(matches!(
        policy.decide(&attempt(429, 10)),
        RetryDecision::Retry { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_header_enables_pacing_once() {
    let policy = RetryPolicy::new(RetryConfig::default());
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from_static("2"));

    let first = policy.observe_headers(&headers).expect("pacing update");
    let repeated = policy.observe_headers(&headers);

    assert!(first.newly_enabled);
    assert_eq!(first.interval, Duration::from_millis(1050));
    assert!(repeated.is_none());
    assert_eq!(policy.pacing_interval(), Duration::from_millis(1050));
}

#[tokio::test(start_paused = true)]
async fn test_responses_without_header_leave_pacing_alone() {
    let policy = RetryPolicy::new(RetryConfig::default());

    assert!(policy.observe_headers(&HeaderMap::new()).is_none());
    assert_eq!(policy.pacing_interval(), Duration::ZERO);
}
