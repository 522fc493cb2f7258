//! Client instances.

use crate::hooks::{HookKind, Hooks};
use crate::options::ClientOptions;
use crate::pipeline::Pipeline;
use crate::target::resolve;
use courier_config::ClientConfig;
use courier_core::{
    adapter_fn, ApiError, ApiResult, CancelToken, Method, Request, Response, RetryBudget, RetryOn,
    SharedAdapter,
};
use courier_queue::{DedupeAdapter, QueueAdapter};
use courier_resilience::cancel_after_with;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

struct ClientInner {
    options: ClientOptions,
    pipeline: Arc<Pipeline>,
    hooks: Hooks,
    parent: Option<Client>,
}

/// A client instance: options, hooks, and a handle on a shared pipeline.
///
/// Cloning is cheap and yields the same instance. Children created with
/// [`Client::create`] share the parent's scheduler, dedupe table and retry
/// policy but own their options and hooks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a root client with its own pipeline.
    ///
    /// Without a transport in `options`, every call fails with a
    /// configuration error.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        let transport = options.transport.clone().unwrap_or_else(unconfigured_transport);
        let policy = options.retry_policy.clone().unwrap_or_default();
        let worker = options.worker_or_default();

        info!(worker, base_url = ?options.base_url, "Creating client");
        let pipeline = Arc::new(Pipeline::new(transport, worker, policy));

        Self {
            inner: Arc::new(ClientInner {
                options,
                pipeline,
                hooks: Hooks::new(),
                parent: None,
            }),
        }
    }

    /// Creates a root client from loaded configuration and a transport.
    #[must_use]
    pub fn from_config(config: &ClientConfig, transport: SharedAdapter) -> Self {
        Self::new(ClientOptions::from(config).with_transport(transport))
    }

    /// Creates a child sharing this client's pipeline.
    ///
    /// `options` are layered over this client's options and this client's
    /// hooks are copied to the child.
    #[must_use]
    pub fn create(&self, options: ClientOptions) -> Client {
        let options = options.merged_over(&self.inner.options);
        let hooks = Hooks::new();
        self.inner.hooks.copy_to(&hooks);

        debug!(base_url = ?options.base_url, prefix_url = ?options.prefix_url, "Creating child client");
        Client {
            inner: Arc::new(ClientInner {
                options,
                pipeline: self.inner.pipeline.clone(),
                hooks,
                parent: Some(self.clone()),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    /// The client this one was created from.
    #[must_use]
    pub fn parent(&self) -> Option<&Client> {
        self.inner.parent.as_ref()
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.inner.pipeline
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<QueueAdapter> {
        self.inner.pipeline.queue()
    }

    #[must_use]
    pub fn dedupe(&self) -> &Arc<DedupeAdapter> {
        self.inner.pipeline.dedupe()
    }

    /// Returns true if both handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Cancels the call holding `key` on the shared pipeline.
    pub fn cancel(&self, key: &str) -> bool {
        self.dedupe().cancel(key)
    }

    /// Cancels every keyed call on the shared pipeline.
    pub fn cancel_all(&self) -> usize {
        self.dedupe().cancel_all()
    }

    /// Starts a request carrying this client's defaults.
    pub fn request(&self, method: Method, target: impl Into<String>) -> RequestBuilder {
        let options = &self.inner.options;
        let mut request = Request::new(method, target)
            .with_priority(options.priority_or_default())
            .with_retry(options.retry.unwrap_or_default())
            .with_retry_delay(options.retry_delay_or_default());
        if let Some(ref statuses) = options.retry_status {
            request = request.with_retry_status(statuses.clone());
        }

        RequestBuilder {
            client: self.clone(),
            request,
            timeout: None,
        }
    }

    pub fn get(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Get, target)
    }

    pub fn head(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Head, target)
    }

    pub fn post(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Post, target)
    }

    pub fn put(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Put, target)
    }

    pub fn patch(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Patch, target)
    }

    pub fn delete(&self, target: impl Into<String>) -> RequestBuilder {
        self.request(Method::Delete, target)
    }

    /// Sends a request: resolves its URL, applies default headers, runs the
    /// hooks and the pipeline.
    pub async fn send(&self, request: Request) -> ApiResult<Response> {
        let options = &self.inner.options;
        let url = resolve(options.base_url.as_deref(), options.prefix_url.as_deref(), request.url());
        let headers = options.headers.merged(request.headers());
        let request = request.with_url(url).with_headers(headers);

        let hooks = &self.inner.hooks;
        let outcome = match hooks.run_request(request).await {
            Ok(request) => self.inner.pipeline.send(request).await,
            Err(error) => hooks.recover(HookKind::RequestError, error).await,
        };

        let outcome = match outcome {
            Ok(response) => hooks.run_response(response).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(error) => hooks.recover(HookKind::ResponseError, error).await,
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.inner.options)
            .field("hooks", &self.inner.hooks)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

fn unconfigured_transport() -> SharedAdapter {
    Arc::new(adapter_fn(|request: Request| async move {
        Err::<Response, _>(ApiError::Configuration(format!(
            "No transport configured for {} {}",
            request.method(),
            request.url()
        )))
    }))
}

/// A request being prepared against a client.
#[must_use = "a request does nothing until sent"]
pub struct RequestBuilder {
    client: Client,
    request: Request,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request = self.request.with_body(body);
        self
    }

    pub fn priority(mut self, priority: impl Into<i32>) -> Self {
        self.request = self.request.with_priority(priority);
        self
    }

    pub fn dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.request = self.request.with_dedupe_key(key);
        self
    }

    /// Sets the legacy request identifier.
    #[deprecated(note = "use `dedupe_key`; the name clashes with `X-Request-ID`")]
    #[allow(deprecated)]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request = self.request.with_request_id(id);
        self
    }

    pub fn retry(mut self, retry: impl Into<RetryBudget>) -> Self {
        self.request = self.request.with_retry(retry);
        self
    }

    pub fn retry_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.request = self.request.with_retry_status(statuses);
        self
    }

    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        self.request = self.request.with_retry_on(RetryOn::new(predicate));
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.request = self.request.with_retry_delay(delay);
        self
    }

    /// Attaches the caller's cancellation token.
    pub fn signal(mut self, signal: CancelToken) -> Self {
        self.request = self.request.with_signal(signal);
        self
    }

    /// Cancels the call if it has not settled after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the request without sending it.
    pub fn build(self) -> Request {
        self.request
    }

    /// Sends the request through the client.
    pub async fn send(self) -> ApiResult<Response> {
        let Self {
            client,
            mut request,
            timeout,
        } = self;

        if let Some(timeout) = timeout {
            let token = cancel_after_with(request.signal(), timeout)?;
            request = request.with_signal(token);
        }

        client.send(request).await
    }
}
