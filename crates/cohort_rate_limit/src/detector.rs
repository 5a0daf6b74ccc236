//! Rate-limit detection from response headers.
//!
//! Servers behind API gateways announce their request quota in a header such
//! as `x-ratelimit-limit`. The detector turns that quota into a pacing
//! interval, the minimum delay between two dispatches.

use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::debug;

/// Reads the configured rate-limit header and converts it to pacing.
#[derive(Debug, Clone)]
pub struct HeaderRateLimitDetector {
    header: String,
    rate_period_ms: u64,
    margin_ms: u64,
}

impl HeaderRateLimitDetector {
    /// Create a detector for `header`, whose limit applies to `rate_period_ms`.
    pub fn new(header: impl Into<String>, rate_period_ms: u64, margin_ms: u64) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
            rate_period_ms,
            margin_ms,
        }
    }

    /// Numeric limit announced by the response, if any.
    pub fn detect_limit(&self, headers: &HeaderMap) -> Option<u32> {
        let limit = parse_header_u32(headers, &self.header)?;
        debug!(limit, header = %self.header, "Detected rate limit header");
        Some(limit)
    }

    /// Pacing interval implied by the response, if it carries a limit.
    pub fn detect_pacing(&self, headers: &HeaderMap) -> Option<Duration> {
        self.detect_limit(headers)
            .map(|limit| pacing_interval(limit, self.rate_period_ms, self.margin_ms))
    }
}

/// `ceil((period + margin) / max(1, limit / 2))` milliseconds.
///
/// Halving the limit accounts for browser-style preflight requests doubling
/// the cost of every call.
///
/// # Examples
///
/// ```
/// use cohort_rate_limit::pacing_interval;
/// use std::time::Duration;
///
/// assert_eq!(pacing_interval(2, 1000, 50), Duration::from_millis(1050));
/// assert_eq!(pacing_interval(20, 1000, 50), Duration::from_millis(105));
/// ```
pub fn pacing_interval(limit: u32, rate_period_ms: u64, margin_ms: u64) -> Duration {
    let per_period = (f64::from(limit) / 2.0).max(1.0);
    let millis = ((rate_period_ms + margin_ms) as f64 / per_period).ceil();
    Duration::from_millis(millis as u64)
}

/// Helper to parse u32 from header value.
fn parse_header_u32(headers: &HeaderMap, key: &str) -> Option<u32> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}
