//! # Courier Core
//!
//! Core types, traits, and error definitions for the Courier request pipeline.
//! Every pipeline layer (retry, dedupe, queue) and the transport underneath
//! speak the same [`Adapter`] shape defined here.

pub mod adapter;
pub mod cancel;
pub mod error;
pub mod headers;
pub mod priority;
pub mod request;
pub mod response;
pub mod result;
pub mod telemetry;

pub use adapter::*;
pub use cancel::*;
pub use error::*;
pub use headers::*;
pub use priority::*;
pub use request::*;
pub use response::*;
pub use result::*;
