//! Outermost pipeline layer: resubmits eligible failures with backoff.

use super::policy::{RetryDecision, RetryPolicy};
use async_trait::async_trait;
use courier_core::{Adapter, ApiError, ApiResult, Request, Response, SharedAdapter};
use metrics::{counter, describe_counter};
use tracing::debug;

/// Total retries scheduled.
pub const REQUESTS_RETRIED_TOTAL: &str = "courier_requests_retried_total";

/// Register the retry metric description.
pub fn register_metrics() {
    describe_counter!(REQUESTS_RETRIED_TOTAL, "Total number of retries scheduled");
}

/// Retry layer wrapping an inner adapter.
///
/// The only layer allowed to swallow an error, and only when the policy
/// deems it eligible. Everything else passes through untouched apart from
/// the retry count stamped on the final outcome.
pub struct RetryAdapter {
    inner: SharedAdapter,
    policy: RetryPolicy,
}

impl RetryAdapter {
    pub fn new(inner: SharedAdapter, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Creates a retry layer with the default policy.
    pub fn with_defaults(inner: SharedAdapter) -> Self {
        Self::new(inner, RetryPolicy::default())
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Adapter for RetryAdapter {
    async fn send(&self, request: Request) -> ApiResult<Response> {
        let mut attempt = request;

        loop {
            if attempt.signal().is_fired() {
                return Err(ApiError::Cancelled);
            }

            let error = match self.inner.send(attempt.clone()).await {
                Ok(response) => return Ok(response.with_retry_count(attempt.retry_count())),
                Err(error) => error,
            };

            let delay = match self.policy.decide(&attempt, &error) {
                RetryDecision::NoRetry => {
                    if attempt.retry_count() > 0 {
                        debug!(
                            url = %attempt.url(),
                            retry_count = attempt.retry_count(),
                            error = %error,
                            "Giving up after retries"
                        );
                    }
                    return Err(error
                        .with_retry_count(attempt.retry_count())
                        .with_request_if_missing(&attempt));
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            debug!(
                method = %attempt.method(),
                url = %attempt.url(),
                attempt = attempt.retry_count() + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );
            counter!(
                REQUESTS_RETRIED_TOTAL,
                "method" => attempt.method().as_str(),
                "status" => error.code().to_string()
            )
            .increment(1);

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = attempt.signal().cancelled() => return Err(ApiError::Cancelled),
            }

            attempt = attempt.next_attempt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{adapter_fn, CancelToken, RetryBudget, RetryOn, TransportFailure};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn flaky(failures: u32, status: u16) -> (SharedAdapter, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let adapter = adapter_fn(move |_request: Request| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < failures {
                    Err(ApiError::status_failure(status))
                } else {
                    Ok(Response::new(200))
                }
            }
        });
        (Arc::new(adapter), calls)
    }

    fn fast(request: Request) -> Request {
        request.with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let (inner, calls) = flaky(2, 500);
        let retry = RetryAdapter::with_defaults(inner);

        let response = retry.send(fast(Request::get("/api/error/unstable"))).await.unwrap();

        assert_eq!(response.retry_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_at_budget() {
        let (inner, calls) = flaky(u32::MAX, 500);
        let retry = RetryAdapter::with_defaults(inner);

        let err = retry
            .send(fast(Request::get("/api/error/500").with_retry(RetryBudget::Max(1))))
            .await
            .unwrap_err();

        assert_eq!(err.code(), 500);
        assert_eq!(err.retry_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_payload_method_not_retried() {
        let (inner, calls) = flaky(u32::MAX, 500);
        let retry = RetryAdapter::with_defaults(inner);

        let err = retry.send(fast(Request::post("/api/error/500"))).await.unwrap_err();

        assert_eq!(err.retry_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_transient_status_surfaces_immediately() {
        let (inner, calls) = flaky(u32::MAX, 422);
        let retry = RetryAdapter::with_defaults(inner);

        let err = retry.send(fast(Request::get("/api/error/422"))).await.unwrap_err();

        assert_eq!(err.status(), Some(422));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_error_passes_through() {
        let inner: SharedAdapter = Arc::new(adapter_fn(|_request: Request| async move {
            Err::<Response, _>(ApiError::Cancelled)
        }));
        let retry = RetryAdapter::with_defaults(inner);

        let err = retry
            .send(Request::get("/").with_retry_on(RetryOn::new(|_| true)))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let (inner, calls) = flaky(u32::MAX, 503);
        let retry = RetryAdapter::with_defaults(inner);
        let signal = CancelToken::new();

        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.fire();
        });

        let request = Request::get("/")
            .with_retry_delay(Duration::from_secs(30))
            .with_signal(signal);
        let err = tokio::time::timeout(Duration::from_secs(5), retry.send(request))
            .await
            .unwrap()
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_reaches_inner() {
        let (inner, calls) = flaky(0, 200);
        let retry = RetryAdapter::with_defaults(inner);
        let signal = CancelToken::new();
        signal.fire();

        let err = retry.send(Request::get("/").with_signal(signal)).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_sets_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let inner: SharedAdapter = Arc::new(adapter_fn(move |_request: Request| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(TransportFailure::from_status(429).with_header("Retry-After", "2").into())
                } else {
                    Ok(Response::new(200))
                }
            }
        }));
        let retry = RetryAdapter::with_defaults(inner);

        let started = tokio::time::Instant::now();
        let response = retry.send(Request::get("/")).await.unwrap();

        assert_eq!(response.retry_count(), 1);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_each_attempt_is_a_new_request() {
        let seen = Arc::new(recorder::Seen::default());
        let recorder = seen.clone();
        let inner: SharedAdapter = Arc::new(adapter_fn(move |request: Request| {
            recorder.push(request.retry_count());
            async move { Err::<Response, _>(ApiError::status_failure(500)) }
        }));
        let retry = RetryAdapter::with_defaults(inner);

        let original = fast(Request::get("/"));
        let _ = retry.send(original.clone()).await;

        assert_eq!(seen.take(), vec![0, 1, 2]);
        assert_eq!(original.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_final_error_carries_last_attempt() {
        let (inner, _) = flaky(u32::MAX, 500);
        let retry = RetryAdapter::with_defaults(inner);

        let err = retry
            .send(fast(Request::get("/api/error/500").with_retry(RetryBudget::Max(1))))
            .await
            .unwrap_err();

        let request = err.as_transport().and_then(TransportFailure::request).unwrap();
        assert_eq!(request.url(), "/api/error/500");
        assert_eq!(request.retry_count(), 1);
        assert_eq!(err.retry_count(), 1);
    }

    mockall::mock! {
        Transport {}

        #[async_trait]
        impl Adapter for Transport {
            async fn send(&self, request: Request) -> ApiResult<Response>;
        }
    }

    #[tokio::test]
    async fn test_mock_transport_sees_budget_plus_one_attempts() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(3)
            .returning(|_| Err(ApiError::status_failure(503)));
        let retry = RetryAdapter::with_defaults(Arc::new(transport));

        let err = retry.send(fast(Request::get("/"))).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(err.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_success_not_resent() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|request| request.retry_count() == 0)
            .times(1)
            .returning(|_| Ok(Response::new(204)));
        let retry = RetryAdapter::with_defaults(Arc::new(transport));

        let response = retry.send(Request::get("/")).await.unwrap();
        assert_eq!(response.status(), 204);
        assert_eq!(response.retry_count(), 0);
    }

    mod recorder {
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Seen(Mutex<Vec<u32>>);

        impl Seen {
            pub fn push(&self, value: u32) {
                self.0.lock().unwrap().push(value);
            }

            pub fn take(&self) -> Vec<u32> {
                std::mem::take(&mut *self.0.lock().unwrap())
            }
        }
    }
}
