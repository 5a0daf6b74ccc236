//! Retry and rate-limit handling for the Cohort request client.
//!
//! - [`RetryPolicy`] decides whether a failed attempt is retried and after
//!   how long, honouring `Retry-After`, a per-request budget and a global
//!   give-up window measured from the last success.
//! - [`HeaderRateLimitDetector`] turns a rate-limit header into a pacing
//!   interval the scheduler enforces between dispatches.

#![warn(missing_docs)]

mod detector;
mod policy;
mod retry_after;

pub use detector::{HeaderRateLimitDetector, pacing_interval};
pub use policy::{FailedAttempt, PacingUpdate, RetryDecision, RetryPolicy};
pub use retry_after::{parse_retry_after, retry_after_from_headers};
