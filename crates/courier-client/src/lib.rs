//! # Courier Client
//!
//! Client instances over the `Retry(Dedupe(Queue(Transport)))` pipeline.
//!
//! A root [`Client`] owns a [`Pipeline`]; children made with
//! [`Client::create`] share it and layer their own options and hooks on top.
//! The [`registry`] holds the process-wide client and [`LazyClient`] defers
//! creation until first use.
//!
//! ```rust,ignore
//! let client = Client::new(
//!     ClientOptions::new()
//!         .with_base_url("https://api.example.com")
//!         .with_transport(transport),
//! );
//!
//! let response = client
//!     .get("/search")
//!     .dedupe_key("search")
//!     .priority(Priority::High)
//!     .send()
//!     .await?;
//! ```

pub mod client;
pub mod hooks;
pub mod lazy;
pub mod options;
pub mod pipeline;
pub mod registry;
pub mod target;

pub use client::{Client, RequestBuilder};
pub use hooks::{ErrorHook, HookId, HookKind, Hooks, RequestHook, ResponseHook};
pub use lazy::LazyClient;
pub use options::ClientOptions;
pub use pipeline::Pipeline;
pub use target::resolve;

pub use courier_core::{
    adapter_fn, Adapter, ApiError, ApiResult, CancelToken, Headers, Method, Priority, Request,
    Response, RetryBudget, SharedAdapter, TransportFailure,
};

/// Registers metric descriptions of every pipeline layer.
pub fn register_metrics() {
    courier_queue::register_metrics();
    courier_resilience::register_metrics();
}
