//! Server-provided backoff hints.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Parses a `Retry-After` value relative to `now`.
///
/// Accepts delta-seconds (`"120"`) or an instant in HTTP-date/RFC 2822 or
/// RFC 3339 form. Instants in the past yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let at = DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()?
        .with_timezone(&Utc);

    (at - now).to_std().ok().filter(|remaining| !remaining.is_zero())
}
