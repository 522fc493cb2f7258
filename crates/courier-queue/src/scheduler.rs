//! Priority scheduler with a worker limit.
//!
//! The backlog is kept sorted by ascending priority and popped from the end,
//! so the highest priority runs first. A new job is inserted in front of the
//! jobs already queued at its priority, which makes equal priorities leave
//! the backlog in submission order.

use crate::metrics::QueueMetrics;
use async_trait::async_trait;
use courier_core::{Adapter, ApiError, ApiResult, ListenerId, Request, Response, SharedAdapter};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Default worker limit.
pub const DEFAULT_WORKER: usize = 5;

/// A request waiting for a worker slot.
struct QueuedJob {
    /// Scheduler-local identity, used to withdraw the job on cancellation.
    id: u64,

    /// Fixed at admission.
    priority: i32,

    request: Request,

    /// Settles the caller's future.
    responder: oneshot::Sender<ApiResult<Response>>,

    /// Withdraws the job from the backlog when the request's token fires.
    listener: ListenerId,
}

impl QueuedJob {
    fn cancel(self, stage: &'static str) {
        QueueMetrics::cancelled(stage);
        let _ = self.responder.send(Err(ApiError::Cancelled));
    }
}

#[derive(Default)]
struct QueueState {
    /// Ascending by priority; the next job to run is the last one.
    backlog: Vec<QueuedJob>,

    in_flight: usize,

    next_id: u64,
}

impl QueueState {
    fn insert(&mut self, job: QueuedJob) {
        let index = self.backlog.partition_point(|queued| queued.priority < job.priority);
        self.backlog.insert(index, job);
    }

    fn withdraw(&mut self, id: u64) -> Option<QueuedJob> {
        let index = self.backlog.iter().position(|job| job.id == id)?;
        Some(self.backlog.remove(index))
    }

    fn record_sizes(&self) {
        QueueMetrics::update_sizes(self.backlog.len(), self.in_flight);
    }
}

struct Shared {
    inner: SharedAdapter,
    worker: usize,
    state: Mutex<QueueState>,
}

/// Queue layer: admits requests into a priority backlog and releases at most
/// `worker` of them to the inner adapter concurrently.
///
/// The backlog is unbounded. Sibling clients share one scheduler by sharing
/// the `QueueAdapter` behind an `Arc`.
#[derive(Clone)]
pub struct QueueAdapter {
    shared: Arc<Shared>,
}

impl QueueAdapter {
    /// Creates a scheduler in front of `inner`. A worker limit of zero is
    /// raised to one.
    pub fn new(inner: SharedAdapter, worker: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner,
                worker: worker.max(1),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Creates a scheduler with [`DEFAULT_WORKER`] slots.
    pub fn with_defaults(inner: SharedAdapter) -> Self {
        Self::new(inner, DEFAULT_WORKER)
    }

    #[must_use]
    pub fn worker(&self) -> usize {
        self.shared.worker
    }

    /// Number of jobs waiting for a slot.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().backlog.len()
    }

    /// Number of jobs currently at the inner adapter.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Admits `request` and waits for it to settle.
    ///
    /// Dropping the returned future abandons the request: a queued job leaves
    /// the backlog and an in-flight one is aborted, freeing its slot.
    pub async fn submit(&self, request: Request) -> ApiResult<Response> {
        let (id, receiver) = self.enqueue(request);
        let abandon = AbandonGuard {
            shared: &self.shared,
            id,
            armed: true,
        };
        Shared::pump(&self.shared);

        let result = receiver
            .await
            .map_err(|_| ApiError::Internal("Queue dropped a pending request".to_string()));
        abandon.disarm();
        result?
    }

    fn enqueue(&self, request: Request) -> (u64, oneshot::Receiver<ApiResult<Response>>) {
        let (responder, receiver) = oneshot::channel();
        let priority = request.priority();
        let signal = request.signal().clone();

        let id = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            id
        };

        // Attached before insertion so a fire racing with admission is seen
        // either by the listener or by the check below.
        let weak = Arc::downgrade(&self.shared);
        let listener = signal.attach(move || Shared::withdraw(&weak, id));

        let job = QueuedJob {
            id,
            priority,
            request,
            responder,
            listener,
        };

        let mut state = self.shared.state.lock();
        if signal.is_fired() {
            drop(state);
            trace!(priority, "Request cancelled before admission");
            job.cancel("queued");
            return (id, receiver);
        }

        state.insert(job);
        state.record_sizes();
        QueueMetrics::enqueued(priority);
        debug!(
            priority,
            pending = state.backlog.len(),
            in_flight = state.in_flight,
            "Request queued"
        );

        (id, receiver)
    }
}

/// Withdraws a job whose caller stopped waiting before it settled.
struct AbandonGuard<'a> {
    shared: &'a Arc<Shared>,
    id: u64,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let job = {
            let mut state = self.shared.state.lock();
            let job = state.withdraw(self.id);
            state.record_sizes();
            job
        };

        if let Some(job) = job {
            job.request.signal().detach(job.listener);
            QueueMetrics::cancelled("abandoned");
            debug!(priority = job.priority, "Queued request abandoned by caller");
        }
    }
}

/// Holds one worker slot. Dropping it frees the slot and admits the next
/// job, also when the inner adapter panics.
struct SlotGuard {
    shared: Arc<Shared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.in_flight -= 1;
            state.record_sizes();
        }
        Shared::pump(&self.shared);
    }
}

impl Shared {
    /// Removes a still-queued job after its token fired.
    fn withdraw(shared: &Weak<Shared>, id: u64) {
        let Some(shared) = shared.upgrade() else {
            return;
        };

        let job = {
            let mut state = shared.state.lock();
            let job = state.withdraw(id);
            state.record_sizes();
            job
        };

        if let Some(job) = job {
            debug!(priority = job.priority, "Queued request cancelled");
            job.cancel("queued");
        }
    }

    /// Admits jobs until the worker limit is reached or the backlog is empty.
    fn pump(shared: &Arc<Shared>) {
        loop {
            let (job, fired) = {
                let mut state = shared.state.lock();
                if state.in_flight >= shared.worker {
                    return;
                }
                let Some(job) = state.backlog.pop() else {
                    return;
                };
                let fired = job.request.signal().is_fired() || job.responder.is_closed();
                if !fired {
                    state.in_flight += 1;
                }
                state.record_sizes();
                (job, fired)
            };

            job.request.signal().detach(job.listener);
            if fired {
                trace!(priority = job.priority, "Skipping cancelled request");
                job.cancel("queued");
                continue;
            }

            Self::dispatch(shared.clone(), job);
        }
    }

    /// Runs one job on its own task. Completion frees the slot and admits the
    /// next job from that task, never from the caller's stack.
    fn dispatch(shared: Arc<Shared>, job: QueuedJob) {
        let QueuedJob {
            priority,
            request,
            mut responder,
            ..
        } = job;

        QueueMetrics::dispatched(request.method().as_str());
        debug!(method = %request.method(), url = %request.url(), priority, "Dispatching request");

        tokio::spawn(async move {
            let slot = SlotGuard { shared };
            let signal = request.signal().clone();
            let result = tokio::select! {
                biased;
                () = signal.cancelled() => {
                    QueueMetrics::cancelled("in_flight");
                    debug!(priority, "In-flight request cancelled");
                    Some(Err(ApiError::Cancelled))
                }
                () = responder.closed() => {
                    QueueMetrics::cancelled("abandoned");
                    debug!(priority, "In-flight request abandoned by caller");
                    None
                }
                result = slot.shared.inner.send(request) => Some(result),
            };

            drop(slot);
            if let Some(result) = result {
                let _ = responder.send(result);
            }
        });
    }
}

#[async_trait]
impl Adapter for QueueAdapter {
    async fn send(&self, request: Request) -> ApiResult<Response> {
        self.submit(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{adapter_fn, CancelToken, Priority};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Transport that records the order of calls and blocks until released.
    struct Gate {
        order: Arc<Mutex<Vec<String>>>,
        permits: Arc<Semaphore>,
        started: Arc<AtomicUsize>,
    }

    impl Gate {
        fn new() -> Self {
            Self {
                order: Arc::new(Mutex::new(Vec::new())),
                permits: Arc::new(Semaphore::new(0)),
                started: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn adapter(&self) -> SharedAdapter {
            let order = self.order.clone();
            let permits = self.permits.clone();
            let started = self.started.clone();
            Arc::new(adapter_fn(move |request: Request| {
                order.lock().push(request.url().to_string());
                started.fetch_add(1, Ordering::SeqCst);
                let permits = permits.clone();
                async move {
                    match permits.acquire().await {
                        Ok(permit) => {
                            permit.forget();
                            Ok(Response::new(200).with_body(request.url().as_bytes().to_vec()))
                        }
                        Err(e) => Err(ApiError::Internal(e.to_string())),
                    }
                }
            }))
        }

        fn release(&self, n: usize) {
            self.permits.add_permits(n);
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().clone()
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_insertion_rule() {
        let mut state = QueueState::default();

        for (id, priority) in [(1, 0), (2, 10), (3, 0), (4, -10), (5, 10)] {
            let (responder, _) = oneshot::channel();
            state.insert(QueuedJob {
                id,
                priority,
                request: Request::get(format!("/{id}")),
                responder,
                listener: CancelToken::new().attach(|| {}),
            });
        }

        let popped: Vec<u64> = std::iter::from_fn(|| state.backlog.pop().map(|job| job.id)).collect();
        assert_eq!(popped, vec![2, 5, 1, 3, 4]);
    }

    #[tokio::test]
    async fn test_worker_limit() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 3);

        let calls: Vec<_> = (0..6)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.submit(Request::get(format!("/{i}"))).await })
            })
            .collect();

        settle().await;
        assert_eq!(gate.started(), 3);
        assert_eq!(queue.in_flight(), 3);
        assert_eq!(queue.pending(), 3);

        gate.release(1);
        settle().await;
        assert_eq!(gate.started(), 4);
        assert_eq!(queue.in_flight(), 3);

        gate.release(5);
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().unwrap().status(), 200);
        }
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_queued_submit_stays_pending() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let mut first = tokio_test::task::spawn(queue.submit(Request::get("/first")));
        let mut second = tokio_test::task::spawn(queue.submit(Request::get("/second")));
        tokio_test::assert_pending!(first.poll());
        tokio_test::assert_pending!(second.poll());

        settle().await;
        assert_eq!(gate.started(), 1);
        assert_eq!(queue.pending(), 1);
        tokio_test::assert_pending!(second.poll());

        gate.release(2);
        settle().await;
        assert!(first.is_woken());
        assert!(second.is_woken());
        assert_eq!(tokio_test::assert_ready!(first.poll()).unwrap().text(), "/first");
        assert_eq!(tokio_test::assert_ready!(second.poll()).unwrap().text(), "/second");
    }

    #[tokio::test]
    async fn test_higher_priority_runs_first() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let mut calls = Vec::new();
        for (url, priority) in [("/a", 0), ("/b", 0), ("/c", 10), ("/d", 0), ("/e", 20)] {
            let queue = queue.clone();
            let request = Request::get(url).with_priority(priority);
            calls.push(tokio::spawn(async move { queue.submit(request).await }));
            settle().await;
        }

        gate.release(5);
        for call in calls {
            call.await.unwrap().unwrap();
        }

        assert_eq!(gate.order(), vec!["/a", "/e", "/c", "/b", "/d"]);
    }

    #[tokio::test]
    async fn test_named_priorities() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let mut calls = Vec::new();
        for (url, priority) in [
            ("/blocker", Priority::Normal),
            ("/low", Priority::Low),
            ("/critical", Priority::Critical),
            ("/high", Priority::High),
        ] {
            let queue = queue.clone();
            let request = Request::get(url).with_priority(priority);
            calls.push(tokio::spawn(async move { queue.submit(request).await }));
            settle().await;
        }

        gate.release(4);
        for call in calls {
            call.await.unwrap().unwrap();
        }

        assert_eq!(gate.order(), vec!["/blocker", "/critical", "/high", "/low"]);
    }

    #[tokio::test]
    async fn test_cancel_while_queued_never_dispatches() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(Request::get("/blocker")).await })
        };
        settle().await;

        let signal = CancelToken::new();
        let queued = {
            let queue = queue.clone();
            let request = Request::get("/queued").with_signal(signal.clone());
            tokio::spawn(async move { queue.submit(request).await })
        };
        settle().await;
        assert_eq!(queue.pending(), 1);

        signal.fire();
        let err = queued.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(queue.pending(), 0);

        gate.release(1);
        blocker.await.unwrap().unwrap();
        assert_eq!(gate.order(), vec!["/blocker"]);
        assert_eq!(signal.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_is_rejected() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);
        let signal = CancelToken::new();
        signal.fire();

        let err = queue
            .submit(Request::get("/").with_signal(signal))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(gate.started(), 0);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_frees_slot() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let signal = CancelToken::new();
        let first = {
            let queue = queue.clone();
            let request = Request::get("/slow").with_signal(signal.clone());
            tokio::spawn(async move { queue.submit(request).await })
        };
        let second = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(Request::get("/next")).await })
        };
        settle().await;
        assert_eq!(gate.started(), 1);

        signal.fire();
        assert!(first.await.unwrap().unwrap_err().is_cancelled());

        settle().await;
        assert_eq!(gate.started(), 2);
        gate.release(1);
        assert_eq!(second.await.unwrap().unwrap().text(), "/next");
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let queue = QueueAdapter::with_defaults(Arc::new(adapter_fn(|_request: Request| async move {
            Err::<Response, _>(ApiError::status_failure(503))
        })));

        let err = queue.send(Request::get("/")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_zero_worker_is_raised_to_one() {
        let queue = QueueAdapter::new(
            Arc::new(adapter_fn(|_request: Request| async move { Ok(Response::new(200)) })),
            0,
        );
        assert_eq!(queue.worker(), 1);

        let response = tokio::time::timeout(Duration::from_secs(5), queue.submit(Request::get("/")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_abandoned_while_queued_never_dispatches() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(Request::get("/blocker")).await })
        };
        settle().await;

        let abandoned = tokio::time::timeout(Duration::from_millis(5), queue.submit(Request::get("/abandoned"))).await;
        assert!(abandoned.is_err());
        assert_eq!(queue.pending(), 0);

        gate.release(2);
        blocker.await.unwrap().unwrap();
        settle().await;

        assert_eq!(gate.order(), vec!["/blocker"]);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_in_flight_frees_slot() {
        let gate = Gate::new();
        let queue = QueueAdapter::new(gate.adapter(), 1);

        let abandoned = tokio::time::timeout(Duration::from_millis(5), queue.submit(Request::get("/abandoned"))).await;
        assert!(abandoned.is_err());
        settle().await;
        assert_eq!(queue.in_flight(), 0);

        gate.release(1);
        let response = tokio::time::timeout(Duration::from_secs(5), queue.submit(Request::get("/next")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.text(), "/next");
        assert_eq!(gate.order(), vec!["/abandoned", "/next"]);
    }

    #[tokio::test]
    async fn test_panicking_transport_frees_slot() {
        let queue = QueueAdapter::new(
            Arc::new(adapter_fn(|request: Request| async move {
                if request.url() == "/boom" {
                    panic!("transport bug");
                }
                Ok(Response::new(200))
            })),
            1,
        );

        let err = queue.submit(Request::get("/boom")).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(queue.in_flight(), 0);

        let response = tokio::time::timeout(Duration::from_secs(5), queue.submit(Request::get("/ok")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
