//! Retry policy engine.
//!
//! Failure classification and backoff decisions live in [`RetryPolicy`];
//! [`RetryAdapter`] applies them around an inner adapter, resubmitting
//! eligible requests with an incremented retry count.

mod adapter;
mod delay;
mod policy;

pub use adapter::{register_metrics, RetryAdapter, REQUESTS_RETRIED_TOTAL};
pub use delay::parse_retry_after;
pub use policy::{RetryDecision, RetryPolicy, DEFAULT_RETRY_MAX, RETRY_STATUS_CODES};
