//! # Courier Queue
//!
//! The two stateful layers of the request pipeline:
//!
//! - [`QueueAdapter`] orders requests by priority and releases at most
//!   `worker` of them to the transport at a time.
//! - [`DedupeAdapter`] keeps at most one call in flight per dedupe key,
//!   cancelling the previous holder when a new one arrives.

pub mod dedupe;
pub mod metrics;
pub mod scheduler;

pub use dedupe::DedupeAdapter;
pub use metrics::{register_metrics, QueueMetrics};
pub use scheduler::{QueueAdapter, DEFAULT_WORKER};
