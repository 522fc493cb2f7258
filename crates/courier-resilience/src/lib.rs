//! # Courier Resilience
//!
//! Resilience patterns for the Courier request pipeline.
//! Provides the retry policy engine and timer-driven cancellation.

pub mod retry;
pub mod timeout;

pub use retry::*;
pub use timeout::*;
