//! Retry decisions and adaptive pacing.

use crate::{HeaderRateLimitDetector, retry_after_from_headers};
use chrono::Utc;
use cohort_core::{RetryBudget, RetryConfig};
use reqwest::header::HeaderMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// A failed attempt, as seen by the policy.
#[derive(Debug, Clone, Copy)]
pub struct FailedAttempt<'a> {
    /// HTTP status, 0 for transport aborts
    pub status: u16,
    /// Whether the caller's cancellation caused the failure
    pub caller_cancelled: bool,
    /// Time between dispatch and failure
    pub elapsed: Duration,
    /// Retries left for the request
    pub budget: RetryBudget,
    /// When the request first failed; the give-up window never opens before it
    pub first_failure: Instant,
    /// Response headers, when a response arrived
    pub headers: Option<&'a HeaderMap>,
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue at the front of the scheduler after `delay`
    Retry {
        /// Backoff before the request becomes dispatchable again
        delay: Duration,
    },
    /// Reject the caller
    GiveUp,
}

/// Pacing observed from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingUpdate {
    /// New minimum delay between dispatches
    pub interval: Duration,
    /// True the first time pacing became non-zero
    pub newly_enabled: bool,
}

#[derive(Debug)]
struct PolicyState {
    last_success: Instant,
    pacing_interval: Duration,
}

/// Classifies failures, computes backoff and tracks server-imposed pacing.
///
/// Shared by every in-flight request of one client; state sits behind a
/// short-lived mutex so decisions from concurrent transport tasks observe
/// each other.
///
/// # Example
///
/// ```
/// use cohort_core::{RetryBudget, RetryConfig};
/// use cohort_rate_limit::{FailedAttempt, RetryDecision, RetryPolicy};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RetryPolicy::new(RetryConfig::default());
/// let decision = policy.decide(&FailedAttempt {
///     status: 404,
///     caller_cancelled: false,
///     elapsed: Duration::from_millis(80),
///     budget: RetryBudget::Unbounded,
///     first_failure: tokio::time::Instant::now(),
///     headers: None,
/// });
/// assert_eq!(decision, RetryDecision::GiveUp);
/// # }
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    detector: HeaderRateLimitDetector,
    state: Mutex<PolicyState>,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(config: RetryConfig) -> Self {
        let detector = HeaderRateLimitDetector::new(
            config.rate_limit_header().clone(),
            *config.rate_period_ms(),
            *config.pacing_margin_ms(),
        );
        Self {
            config,
            detector,
            state: Mutex::new(PolicyState {
                last_success: Instant::now(),
                pacing_interval: Duration::ZERO,
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PolicyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Budget a new request starts with.
    pub fn default_budget(&self) -> RetryBudget {
        match self.config.default_retries() {
            Some(n) => RetryBudget::Limited(*n),
            None => RetryBudget::Unbounded,
        }
    }

    /// Record a successful response; restarts the give-up window.
    pub fn record_success(&self) {
        self.state().last_success = Instant::now();
    }

    /// Time since the last successful response.
    pub fn since_last_success(&self) -> Duration {
        self.state().last_success.elapsed()
    }

    /// Time the give-up window has been open for `attempt`.
    ///
    /// The window opens at the later of the last success and the request's
    /// first failure, so an idle client still retries its first 429.
    pub fn window_elapsed(&self, attempt: &FailedAttempt<'_>) -> Duration {
        let last_success = self.state().last_success;
        last_success.max(attempt.first_failure).elapsed()
    }

    /// Current detected pacing interval.
    pub fn pacing_interval(&self) -> Duration {
        self.state().pacing_interval
    }

    /// Inspect a response for a rate-limit header and update pacing.
    #[instrument(skip(self, headers))]
    pub fn observe_headers(&self, headers: &HeaderMap) -> Option<PacingUpdate> {
        let interval = self.detector.detect_pacing(headers)?;
        let mut state = self.state();
        let newly_enabled = state.pacing_interval.is_zero() && !interval.is_zero();
        if state.pacing_interval == interval {
            return None;
        }
        state.pacing_interval = interval;
        if newly_enabled {
            info!(interval_ms = interval.as_millis() as u64, "Server rate limit detected, pacing enabled");
        } else {
            debug!(interval_ms = interval.as_millis() as u64, "Pacing interval updated");
        }
        Some(PacingUpdate {
            interval,
            newly_enabled,
        })
    }

    /// Whether a failure class is transient.
    ///
    /// 429 always is; an abort is when it happened inside the preflight
    /// window without the caller asking for it, which is how provider-side
    /// rate limiting shows up as opposed to a genuine timeout.
    pub fn is_retryable(&self, attempt: &FailedAttempt<'_>) -> bool {
        match attempt.status {
            429 => true,
            0 => !attempt.caller_cancelled && attempt.elapsed < self.config.preflight_window(),
            _ => false,
        }
    }

    /// Delay before retrying: `Retry-After` when usable, else the default.
    pub fn retry_delay(&self, headers: Option<&HeaderMap>) -> Duration {
        headers
            .and_then(|h| retry_after_from_headers(h, Utc::now()))
            .unwrap_or_else(|| self.config.default_retry_delay())
    }

    /// Decide whether a failed attempt is retried.
    #[instrument(skip(self, attempt), fields(status = attempt.status))]
    pub fn decide(&self, attempt: &FailedAttempt<'_>) -> RetryDecision {
        if !self.is_retryable(attempt) {
            return RetryDecision::GiveUp;
        }
        if !attempt.budget.allows_retry() {
            debug!("Retry budget exhausted");
            return RetryDecision::GiveUp;
        }
        if self.window_elapsed(attempt) >= self.config.give_up_window() {
            debug!("Give-up window elapsed");
            return RetryDecision::GiveUp;
        }
        let delay = self.retry_delay(attempt.headers);
        debug!(delay_ms = delay.as_millis() as u64, "Retrying request");
        RetryDecision::Retry { delay }
    }
}
