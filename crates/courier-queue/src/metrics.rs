//! Metrics for the scheduler and dedupe layers.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names for the request queue.
pub mod names {
    /// Total requests admitted to the backlog.
    pub const REQUESTS_ENQUEUED_TOTAL: &str = "courier_requests_enqueued_total";
    /// Total requests handed to the transport.
    pub const REQUESTS_DISPATCHED_TOTAL: &str = "courier_requests_dispatched_total";
    /// Total requests settled as cancelled by the queue.
    pub const REQUESTS_CANCELLED_TOTAL: &str = "courier_requests_cancelled_total";
    /// Total requests cancelled by a newer request with the same dedupe key.
    pub const REQUESTS_SUPERSEDED_TOTAL: &str = "courier_requests_superseded_total";

    /// Current backlog size.
    pub const QUEUE_PENDING: &str = "courier_queue_pending";
    /// Current in-flight requests.
    pub const QUEUE_IN_FLIGHT: &str = "courier_queue_in_flight";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::REQUESTS_ENQUEUED_TOTAL,
        "Total number of requests admitted to the backlog"
    );
    describe_counter!(
        names::REQUESTS_DISPATCHED_TOTAL,
        "Total number of requests handed to the transport"
    );
    describe_counter!(
        names::REQUESTS_CANCELLED_TOTAL,
        "Total number of requests cancelled while queued or in flight"
    );
    describe_counter!(
        names::REQUESTS_SUPERSEDED_TOTAL,
        "Total number of requests cancelled by a newer request with the same dedupe key"
    );

    describe_gauge!(names::QUEUE_PENDING, "Current number of queued requests");
    describe_gauge!(
        names::QUEUE_IN_FLIGHT,
        "Current number of requests in flight at the transport"
    );
}

/// Queue metrics recorder.
#[derive(Clone)]
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a request entering the backlog.
    pub fn enqueued(priority: i32) {
        counter!(
            names::REQUESTS_ENQUEUED_TOTAL,
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a request handed to the transport.
    pub fn dispatched(method: &'static str) {
        counter!(names::REQUESTS_DISPATCHED_TOTAL, "method" => method).increment(1);
    }

    /// Record a cancellation. `stage` is `queued` or `in_flight`.
    pub fn cancelled(stage: &'static str) {
        counter!(names::REQUESTS_CANCELLED_TOTAL, "stage" => stage).increment(1);
    }

    /// Record a dedupe collision.
    pub fn superseded() {
        counter!(names::REQUESTS_SUPERSEDED_TOTAL).increment(1);
    }

    /// Update backlog and concurrency gauges.
    pub fn update_sizes(pending: usize, in_flight: usize) {
        gauge!(names::QUEUE_PENDING).set(pending as f64);
        gauge!(names::QUEUE_IN_FLIGHT).set(in_flight as f64);
    }
}
