//! Rate-limit backoff for the calendar client.
//!
//! A `429` is absorbed by waiting and reissuing the same request. The wait
//! comes from the `Retry-After` header when it carries an HTTP date or a
//! number of seconds, and falls back to `default_delay` otherwise. Waits are
//! capped at `max_delay`, and a request gives up after `max_retries`
//! consecutive rate-limited responses.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn allows_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Wait before reissuing a rate-limited request.
    pub fn delay_for(&self, retry_after: Option<&str>, now: DateTime<Utc>) -> Duration {
        retry_after
            .and_then(|value| parse_retry_after(value, now))
            .unwrap_or(self.default_delay)
            .min(self.max_delay)
    }
}

/// Parses a `Retry-After` value: an HTTP date first, then whole seconds.
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&Utc) - now;
        return Some(wait.to_std().unwrap_or(Duration::ZERO));
    }

    value.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn numeric_seconds_are_used_verbatim() {
        assert_eq!(parse_retry_after("7", now()), Some(Duration::from_secs(7)));
    }

    #[test]
    fn http_date_waits_until_that_instant() {
        let wait = parse_retry_after("Fri, 14 Mar 2025 12:00:30 GMT", now());

        assert_eq!(wait, Some(Duration::from_secs(30)));
    }

    #[test]
    fn http_date_in_the_past_waits_zero() {
        let wait = parse_retry_after("Fri, 14 Mar 2025 11:59:00 GMT", now());

        assert_eq!(wait, Some(Duration::ZERO));
    }

    #[test]
    fn negative_or_garbage_values_are_rejected() {
        assert_eq!(parse_retry_after("-3", now()), None);
        assert_eq!(parse_retry_after("soon", now()), None);
        assert_eq!(parse_retry_after("", now()), None);
    }

    #[test]
    fn missing_header_uses_default_delay() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(None, now()), Duration::from_secs(1));
        assert_eq!(policy.delay_for(Some("later"), now()), Duration::from_secs(1));
    }

    #[test]
    fn long_waits_are_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for(Some("3600"), now()), Duration::from_secs(10));
    }

    #[test]
    fn retry_budget_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };

        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }
}
