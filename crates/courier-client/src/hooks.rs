//! Per-client interception hooks.
//!
//! Each hook kind has its own ordered registry. Handles are issued in
//! increasing order, so iterating a registry visits hooks in the order they
//! were added.

use courier_core::{ApiError, ApiResult, BoxFuture, Request, Response};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transforms or rejects a request before it enters the pipeline.
pub type RequestHook = Arc<dyn Fn(Request) -> BoxFuture<'static, Request> + Send + Sync>;

/// Transforms or rejects a settled response.
pub type ResponseHook = Arc<dyn Fn(Response) -> BoxFuture<'static, Response> + Send + Sync>;

/// Recovers from an error with a response, or passes an error on.
pub type ErrorHook = Arc<dyn Fn(ApiError) -> BoxFuture<'static, Response> + Send + Sync>;

/// Opaque handle of a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

/// Hook kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs on every outgoing request.
    Request,
    /// Runs on every successful response.
    Response,
    /// Runs when a request hook fails.
    RequestError,
    /// Runs when the pipeline or a response hook fails.
    ResponseError,
}

impl HookKind {
    pub const ALL: [HookKind; 4] = [
        HookKind::Request,
        HookKind::Response,
        HookKind::RequestError,
        HookKind::ResponseError,
    ];
}

/// Hook registry of one client.
#[derive(Default)]
pub struct Hooks {
    next_id: AtomicU64,
    on_request: RwLock<BTreeMap<HookId, RequestHook>>,
    on_response: RwLock<BTreeMap<HookId, ResponseHook>>,
    on_request_error: RwLock<BTreeMap<HookId, ErrorHook>>,
    on_response_error: RwLock<BTreeMap<HookId, ErrorHook>>,
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> HookId {
        HookId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a request hook.
    pub fn on_request<F, Fut>(&self, hook: F) -> HookId
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Request>> + Send + 'static,
    {
        self.add_request(Arc::new(move |request| -> BoxFuture<'static, Request> {
            Box::pin(hook(request))
        }))
    }

    /// Adds a response hook.
    pub fn on_response<F, Fut>(&self, hook: F) -> HookId
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Response>> + Send + 'static,
    {
        self.add_response(Arc::new(move |response| -> BoxFuture<'static, Response> {
            Box::pin(hook(response))
        }))
    }

    /// Adds a hook run when a request hook fails.
    pub fn on_request_error<F, Fut>(&self, hook: F) -> HookId
    where
        F: Fn(ApiError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Response>> + Send + 'static,
    {
        self.add_error(HookKind::RequestError, error_hook(hook))
    }

    /// Adds a hook run when the call fails.
    pub fn on_response_error<F, Fut>(&self, hook: F) -> HookId
    where
        F: Fn(ApiError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Response>> + Send + 'static,
    {
        self.add_error(HookKind::ResponseError, error_hook(hook))
    }

    pub fn add_request(&self, hook: RequestHook) -> HookId {
        let id = self.next_id();
        self.on_request.write().insert(id, hook);
        id
    }

    pub fn add_response(&self, hook: ResponseHook) -> HookId {
        let id = self.next_id();
        self.on_response.write().insert(id, hook);
        id
    }

    /// Adds an error hook. `kind` must be one of the error kinds; other kinds
    /// register it as a response-error hook.
    pub fn add_error(&self, kind: HookKind, hook: ErrorHook) -> HookId {
        let id = self.next_id();
        match kind {
            HookKind::RequestError => self.on_request_error.write().insert(id, hook),
            _ => self.on_response_error.write().insert(id, hook),
        };
        id
    }

    /// Removes a hook. Returns false if no hook of that kind has that handle.
    pub fn remove(&self, kind: HookKind, id: HookId) -> bool {
        match kind {
            HookKind::Request => self.on_request.write().remove(&id).is_some(),
            HookKind::Response => self.on_response.write().remove(&id).is_some(),
            HookKind::RequestError => self.on_request_error.write().remove(&id).is_some(),
            HookKind::ResponseError => self.on_response_error.write().remove(&id).is_some(),
        }
    }

    /// Removes every hook of every kind.
    pub fn reset(&self) {
        self.on_request.write().clear();
        self.on_response.write().clear();
        self.on_request_error.write().clear();
        self.on_response_error.write().clear();
    }

    /// Registers every hook of `self` on `target`, keeping their order.
    pub fn copy_to(&self, target: &Hooks) {
        for hook in self.on_request.read().values() {
            target.add_request(hook.clone());
        }
        for hook in self.on_response.read().values() {
            target.add_response(hook.clone());
        }
        for hook in self.on_request_error.read().values() {
            target.add_error(HookKind::RequestError, hook.clone());
        }
        for hook in self.on_response_error.read().values() {
            target.add_error(HookKind::ResponseError, hook.clone());
        }
    }

    /// Number of hooks of `kind`.
    #[must_use]
    pub fn len(&self, kind: HookKind) -> usize {
        match kind {
            HookKind::Request => self.on_request.read().len(),
            HookKind::Response => self.on_response.read().len(),
            HookKind::RequestError => self.on_request_error.read().len(),
            HookKind::ResponseError => self.on_response_error.read().len(),
        }
    }

    /// Returns true if no hook of any kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        HookKind::ALL.iter().all(|&kind| self.len(kind) == 0)
    }

    /// Threads `request` through the request hooks.
    pub(crate) async fn run_request(&self, mut request: Request) -> ApiResult<Request> {
        let hooks: Vec<RequestHook> = self.on_request.read().values().cloned().collect();
        for hook in hooks {
            request = hook(request).await?;
        }
        Ok(request)
    }

    /// Threads `response` through the response hooks.
    pub(crate) async fn run_response(&self, mut response: Response) -> ApiResult<Response> {
        let hooks: Vec<ResponseHook> = self.on_response.read().values().cloned().collect();
        for hook in hooks {
            response = hook(response).await?;
        }
        Ok(response)
    }

    /// Offers `error` to the error hooks of `kind` until one recovers.
    pub(crate) async fn recover(&self, kind: HookKind, mut error: ApiError) -> ApiResult<Response> {
        let registry = match kind {
            HookKind::RequestError => &self.on_request_error,
            _ => &self.on_response_error,
        };
        let hooks: Vec<ErrorHook> = registry.read().values().cloned().collect();

        for hook in hooks {
            match hook(error).await {
                Ok(response) => return Ok(response),
                Err(next) => error = next,
            }
        }
        Err(error)
    }
}

fn error_hook<F, Fut>(hook: F) -> ErrorHook
where
    F: Fn(ApiError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<Response>> + Send + 'static,
{
    Arc::new(move |error| -> BoxFuture<'static, Response> { Box::pin(hook(error)) })
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_request", &self.len(HookKind::Request))
            .field("on_response", &self.len(HookKind::Response))
            .field("on_request_error", &self.len(HookKind::RequestError))
            .field("on_response_error", &self.len(HookKind::ResponseError))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_hooks_run_in_insertion_order() {
        let hooks = Hooks::new();
        hooks.on_request(|request: Request| async move {
            let url = format!("{}/a", request.url());
            Ok(request.with_url(url))
        });
        hooks.on_request(|request: Request| async move {
            let url = format!("{}/b", request.url());
            Ok(request.with_url(url))
        });

        let request = hooks.run_request(Request::get("")).await.unwrap();
        assert_eq!(request.url(), "/a/b");
    }

    #[tokio::test]
    async fn test_remove_and_reset() {
        let hooks = Hooks::new();
        let id = hooks.on_response(|response: Response| async move { Ok(response) });
        hooks.on_response_error(|error: ApiError| async move { Err(error) });

        assert!(hooks.remove(HookKind::Response, id));
        assert!(!hooks.remove(HookKind::Response, id));
        assert!(!hooks.remove(HookKind::Request, id));
        assert_eq!(hooks.len(HookKind::ResponseError), 1);

        hooks.reset();
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_error_hook_recovers() {
        let hooks = Hooks::new();
        hooks.on_response_error(|error: ApiError| async move { Err(error) });
        hooks.on_response_error(|error: ApiError| async move {
            match error.status() {
                Some(404) => Ok(Response::new(200).with_body("fallback")),
                _ => Err(error),
            }
        });

        let recovered = hooks
            .recover(HookKind::ResponseError, ApiError::status_failure(404))
            .await
            .unwrap();
        assert_eq!(recovered.text(), "fallback");

        let err = hooks
            .recover(HookKind::ResponseError, ApiError::status_failure(500))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_copy_to_keeps_order_and_independence() {
        let source = Hooks::new();
        source.on_request(|request: Request| async move {
            let url = format!("{}/first", request.url());
            Ok(request.with_url(url))
        });
        source.on_request(|request: Request| async move {
            let url = format!("{}/second", request.url());
            Ok(request.with_url(url))
        });

        let target = Hooks::new();
        source.copy_to(&target);
        source.reset();

        assert_eq!(target.len(HookKind::Request), 2);
        let request = target.run_request(Request::get("")).await.unwrap();
        assert_eq!(request.url(), "/first/second");
    }

    #[tokio::test]
    async fn test_failing_request_hook_stops_chain() {
        let hooks = Hooks::new();
        hooks.on_request(|_request: Request| async move {
            Err::<Request, _>(ApiError::Configuration("missing token".into()))
        });
        hooks.on_request(|_request: Request| async move {
            Err::<Request, _>(ApiError::Internal("unreachable".into()))
        });

        let err = hooks.run_request(Request::get("/")).await.unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }
}
