//! Result type aliases for the request pipeline.

use crate::{ApiError, Response};

/// A specialized `Result` type for pipeline operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A boxed future returning an `ApiResult`.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = ApiResult<T>> + Send + 'a>>;

/// Boxed future settling one call through an adapter.
pub type ResponseFuture<'a> = BoxFuture<'a, Response>;
