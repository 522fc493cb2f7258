//! The shared adapter shape: `(Request) -> Future<Response>`.
//!
//! The transport and every pipeline layer implement [`Adapter`], so layers
//! wrap each other without knowing what sits underneath.

use crate::{ApiResult, Request, Response};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A stage that settles a request into a response or a classified error.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Sends the request through this stage.
    async fn send(&self, request: Request) -> ApiResult<Response>;
}

/// Shared, type-erased adapter.
pub type SharedAdapter = Arc<dyn Adapter>;

#[async_trait]
impl<A> Adapter for Arc<A>
where
    A: Adapter + ?Sized,
{
    async fn send(&self, request: Request) -> ApiResult<Response> {
        (**self).send(request).await
    }
}

/// Adapter backed by an async closure.
pub struct FnAdapter<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Adapter for FnAdapter<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = ApiResult<Response>> + Send,
{
    async fn send(&self, request: Request) -> ApiResult<Response> {
        (self.f)(request).await
    }
}

/// Wraps an async closure as an [`Adapter`].
///
/// ```rust,ignore
/// let transport = adapter_fn(|request| async move { Ok(Response::new(200)) });
/// ```
pub fn adapter_fn<F, Fut>(f: F) -> FnAdapter<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = ApiResult<Response>> + Send,
{
    FnAdapter { f }
}
