//! # Courier Config
//!
//! Client configuration for the Courier request pipeline.
//! Supports layered configuration from files and environment variables,
//! validated before use.

mod client_config;
mod loader;
mod validation;

pub use client_config::*;
pub use loader::*;
pub use validation::*;
