//! Shared stub transport for pipeline scenarios.

#![allow(dead_code)]

use async_trait::async_trait;
use courier_client::{Adapter, ApiError, ApiResult, Request, Response, SharedAdapter, TransportFailure};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Transport double that records every call it starts.
///
/// Replies follow the scripted status sequence and fall back to 200 once the
/// script runs out. Failures carry a `Retry-After` header when one is set.
#[derive(Default)]
pub struct StubTransport {
    latency: Duration,
    script: Mutex<VecDeque<u16>>,
    retry_after: Option<String>,
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_script(self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.script.lock().extend(statuses);
        self
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// URLs of the calls that reached the transport, in start order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.started.lock().len()
    }

    /// Highest number of calls that were running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Adapter for StubTransport {
    async fn send(&self, request: Request) -> ApiResult<Response> {
        self.started.lock().push(request.url().to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let status = self.script.lock().pop_front().unwrap_or(200);

        tokio::select! {
            biased;
            () = request.signal().cancelled() => return Err(ApiError::Cancelled),
            () = tokio::time::sleep(self.latency) => {}
        }

        if (200..300).contains(&status) {
            return Ok(Response::new(status).with_body(request.url().as_bytes().to_vec()));
        }

        let mut failure = TransportFailure::from_status(status).with_request(request);
        if let Some(ref value) = self.retry_after {
            failure = failure.with_header("retry-after", value.clone());
        }
        Err(ApiError::Transport(Box::new(failure)))
    }
}

pub fn as_transport(stub: &Arc<StubTransport>) -> SharedAdapter {
    stub.clone()
}
