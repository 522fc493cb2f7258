//! Client options.

use courier_config::ClientConfig;
use courier_core::{Headers, Priority, RetryBudget, SharedAdapter, DEFAULT_RETRY_DELAY};
use courier_queue::DEFAULT_WORKER;
use courier_resilience::RetryPolicy;
use std::fmt;
use std::time::Duration;

/// Options of one client instance.
///
/// Unset fields inherit from the parent when the client is created with
/// [`Client::create`](crate::Client::create). `worker`, `transport` and
/// `retry_policy` only take effect on a root client: children share the
/// parent's pipeline.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Base URL prepended to relative targets.
    pub base_url: Option<String>,

    /// Path segment inserted between the base URL and the target.
    pub prefix_url: Option<String>,

    /// Default headers, merged key-wise with the parent's.
    pub headers: Headers,

    /// Default request priority.
    pub priority: Option<i32>,

    /// Default retry budget.
    pub retry: Option<RetryBudget>,

    /// Default base delay between attempts.
    pub retry_delay: Option<Duration>,

    /// Default retry statuses attached to each request.
    pub retry_status: Option<Vec<u16>>,

    /// Scheduler worker limit.
    pub worker: Option<usize>,

    /// Retry policy of the pipeline.
    pub retry_policy: Option<RetryPolicy>,

    /// Leaf adapter performing the network exchange.
    pub transport: Option<SharedAdapter>,
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_prefix_url(mut self, prefix_url: impl Into<String>) -> Self {
        self.prefix_url = Some(prefix_url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: impl Into<RetryBudget>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_retry_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retry_status = Some(statuses.into());
        self
    }

    #[must_use]
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: SharedAdapter) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Layers `self` over `parent`: set fields win, headers merge key-wise.
    #[must_use]
    pub fn merged_over(&self, parent: &ClientOptions) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone().or_else(|| parent.base_url.clone()),
            prefix_url: self.prefix_url.clone().or_else(|| parent.prefix_url.clone()),
            headers: parent.headers.merged(&self.headers),
            priority: self.priority.or(parent.priority),
            retry: self.retry.or(parent.retry),
            retry_delay: self.retry_delay.or(parent.retry_delay),
            retry_status: self.retry_status.clone().or_else(|| parent.retry_status.clone()),
            worker: self.worker.or(parent.worker),
            retry_policy: self.retry_policy.clone().or_else(|| parent.retry_policy.clone()),
            transport: self.transport.clone().or_else(|| parent.transport.clone()),
        }
    }

    pub(crate) fn worker_or_default(&self) -> usize {
        self.worker.unwrap_or(DEFAULT_WORKER)
    }

    pub(crate) fn priority_or_default(&self) -> i32 {
        self.priority.unwrap_or_else(|| Priority::Normal.into())
    }

    pub(crate) fn retry_delay_or_default(&self) -> Duration {
        self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY)
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            base_url: config.client.base_url.clone(),
            prefix_url: config.client.prefix_url.clone(),
            headers: config.client.headers.iter().collect(),
            priority: Some(config.priority.into()),
            retry: Some(config.retry.budget()),
            retry_delay: Some(config.retry.delay()),
            retry_status: None,
            worker: Some(config.queue.worker),
            retry_policy: Some(
                RetryPolicy::with_default_max(config.retry.default_max)
                    .with_status_codes(config.retry.status.clone()),
            ),
            transport: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("prefix_url", &self.prefix_url)
            .field("headers", &self.headers)
            .field("priority", &self.priority)
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("retry_status", &self.retry_status)
            .field("worker", &self.worker)
            .field("retry_policy", &self.retry_policy)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
