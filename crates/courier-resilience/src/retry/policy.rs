//! Retry eligibility and backoff decisions.

use super::delay::parse_retry_after;
use chrono::Utc;
use courier_core::{ApiError, Request, RetryBudget};
use std::time::Duration;

/// Retry budget for methods without payload semantics.
pub const DEFAULT_RETRY_MAX: u32 = 2;

/// Transient HTTP statuses retried by default.
pub const RETRY_STATUS_CODES: [u16; 8] = [
    408, // Request Timeout
    409, // Conflict
    425, // Too Early
    429, // Too Many Requests
    500, // Internal Server Error
    502, // Bad Gateway
    503, // Service Unavailable
    504, // Gateway Timeout
];

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Surface the error to the caller.
    NoRetry,
    /// Resubmit after the given delay.
    RetryAfter(Duration),
}

/// Retry policy shared by every request passing through a [`RetryAdapter`](super::RetryAdapter).
///
/// Per-request fields (`retry`, `retry_status`, `retry_on`, `retry_delay`)
/// override the policy defaults.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Budget for non-payload methods when the request does not set one.
    pub default_max: u32,
    /// Statuses retried when the request does not set its own list.
    pub status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_max: DEFAULT_RETRY_MAX,
            status_codes: RETRY_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom default budget.
    #[must_use]
    pub fn with_default_max(default_max: u32) -> Self {
        Self {
            default_max,
            ..Default::default()
        }
    }

    /// Sets the default retry statuses.
    #[must_use]
    pub fn with_status_codes(mut self, status_codes: impl Into<Vec<u16>>) -> Self {
        self.status_codes = status_codes.into();
        self
    }

    /// Maximum number of retries for this request.
    ///
    /// Payload-bearing methods get zero unless the request opts in explicitly.
    #[must_use]
    pub fn retry_max(&self, request: &Request) -> u32 {
        match request.retry() {
            RetryBudget::Max(max) => max,
            RetryBudget::Default | RetryBudget::Disabled => {
                if request.method().is_payload() {
                    0
                } else {
                    self.default_max
                }
            }
        }
    }

    /// Returns true if `error` from `request` should be resubmitted.
    #[must_use]
    pub fn is_eligible(&self, request: &Request, error: &ApiError) -> bool {
        if request.retry() == RetryBudget::Disabled {
            return false;
        }

        if error.is_cancelled() {
            return false;
        }

        if let Some(predicate) = request.retry_on() {
            return predicate.check(error);
        }

        if request.retry_count() >= self.retry_max(request) {
            return false;
        }

        let Some(failure) = error.as_transport() else {
            return false;
        };

        let status = failure.status().unwrap_or(500);
        request
            .retry_status()
            .unwrap_or(self.status_codes.as_slice())
            .contains(&status)
    }

    /// Delay before the next attempt.
    ///
    /// A `Retry-After` header wins; otherwise the delay grows linearly with
    /// the retry count.
    #[must_use]
    pub fn delay_for(&self, request: &Request, error: &ApiError) -> Duration {
        if let Some(hint) = error
            .header("retry-after")
            .and_then(|value| parse_retry_after(value, Utc::now()))
        {
            return hint;
        }

        request
            .retry_delay()
            .saturating_mul(request.retry_count().saturating_add(1))
    }

    /// Classifies a failure into a retry decision.
    #[must_use]
    pub fn decide(&self, request: &Request, error: &ApiError) -> RetryDecision {
        if self.is_eligible(request, error) {
            RetryDecision::RetryAfter(self.delay_for(request, error))
        } else {
            RetryDecision::NoRetry
        }
    }
}
