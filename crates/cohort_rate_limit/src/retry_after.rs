//! `Retry-After` parsing.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Parse a `Retry-After` value given as delay-seconds or an HTTP-date.
///
/// Returns `None` for unparsable values and for dates not in the future,
/// so the caller falls back to its default delay.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use cohort_rate_limit::parse_retry_after;
/// use std::time::Duration;
///
/// let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
/// assert_eq!(parse_retry_after("2", now), Some(Duration::from_secs(2)));
/// assert_eq!(
///     parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
///     Some(Duration::from_secs(30))
/// );
/// assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now), None);
/// assert_eq!(parse_retry_after("soon", now), None);
/// ```
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (date - now).to_std().ok().filter(|delay| !delay.is_zero())
}

/// `Retry-After` delay of a response, if present and usable.
pub fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, now)
}
