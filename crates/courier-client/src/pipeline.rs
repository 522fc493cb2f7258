//! Adapter pipeline: `Retry(Dedupe(Queue(Transport)))`.

use async_trait::async_trait;
use courier_core::{Adapter, ApiResult, CancelToken, ListenerId, Request, Response, SharedAdapter};
use courier_queue::{DedupeAdapter, QueueAdapter};
use courier_resilience::{RetryAdapter, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, trace};

/// The composed pipeline shared by a root client and all of its children.
pub struct Pipeline {
    transport: SharedAdapter,
    queue: Arc<QueueAdapter>,
    dedupe: Arc<DedupeAdapter>,
    retry: Arc<RetryAdapter>,
}

impl Pipeline {
    /// Builds the layers around `transport`, innermost first.
    pub fn new(transport: SharedAdapter, worker: usize, policy: RetryPolicy) -> Self {
        let queue = Arc::new(QueueAdapter::new(transport.clone(), worker));
        let dedupe = Arc::new(DedupeAdapter::new(queue.clone()));
        let retry = Arc::new(RetryAdapter::new(dedupe.clone(), policy));

        Self {
            transport,
            queue,
            dedupe,
            retry,
        }
    }

    #[must_use]
    pub fn transport(&self) -> &SharedAdapter {
        &self.transport
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<QueueAdapter> {
        &self.queue
    }

    #[must_use]
    pub fn dedupe(&self) -> &Arc<DedupeAdapter> {
        &self.dedupe
    }

    #[must_use]
    pub fn retry(&self) -> &Arc<RetryAdapter> {
        &self.retry
    }

    /// Sends one logical call through every layer.
    ///
    /// The call runs under its own token, a child of the caller's. Firing
    /// the caller's token aborts the call wherever it sits, while a dedupe
    /// collision or `cancel(key)` aborts only this call and leaves the
    /// caller's token alone. The dedupe key is released when the call ends,
    /// whatever the outcome, and dropping the future aborts the call.
    pub async fn send(&self, request: Request) -> ApiResult<Response> {
        let caller = request.signal().clone();
        let (token, link) = caller.child();
        trace!(method = %request.method(), url = %request.url(), "Entering pipeline");

        let call = CallGuard {
            dedupe: &self.dedupe,
            key: request.dedupe_key().map(str::to_string),
            token: token.clone(),
            caller,
            link,
            settled: false,
        };

        let result = self.retry.send(request.with_signal(token)).await;
        call.settle();
        result
    }
}

/// Ends one pipeline call: aborts it if it never settled, unlinks the
/// caller's token and gives up the dedupe key.
struct CallGuard<'a> {
    dedupe: &'a DedupeAdapter,
    key: Option<String>,
    token: CancelToken,
    caller: CancelToken,
    link: ListenerId,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Pipeline call abandoned by caller");
            self.token.fire();
        }
        self.caller.detach(self.link);
        if let Some(ref key) = self.key {
            self.dedupe.release(key, &self.token);
        }
    }
}

#[async_trait]
impl Adapter for Pipeline {
    async fn send(&self, request: Request) -> ApiResult<Response> {
        Pipeline::send(self, request).await
    }
}
