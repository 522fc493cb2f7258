//! Client configuration structures.

use courier_core::telemetry::TelemetryConfig;
use courier_core::{ApiError, ApiResult, Priority, RetryBudget};
use courier_resilience::{DEFAULT_RETRY_MAX, RETRY_STATUS_CODES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Target and default headers.
    #[serde(default)]
    pub client: ClientSection,

    /// Scheduler configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Retry defaults.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Default request priority.
    #[serde(default)]
    pub priority: Priority,

    /// Tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ClientConfig {
    /// Parses a configuration from TOML text, filling defaults.
    pub fn from_toml_str(text: &str) -> ApiResult<Self> {
        toml::from_str(text).map_err(|e| ApiError::Configuration(e.to_string()))
    }
}

/// Request target and headers applied to every call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    /// Base URL prepended to relative targets.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Path segment inserted between the base URL and the target.
    #[serde(default)]
    pub prefix_url: Option<String>,

    /// Default headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum requests in flight at the transport.
    #[serde(default = "default_worker")]
    pub worker: usize,
}

fn default_worker() -> usize {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker: default_worker(),
        }
    }
}

/// Retry defaults applied to requests that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Set to false to disable retries entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Explicit budget for every method. When unset, payload methods get no
    /// retries and the rest get `default_max`.
    #[serde(default)]
    pub max: Option<u32>,

    /// Budget for non-payload methods.
    #[serde(default = "default_max")]
    pub default_max: u32,

    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Statuses eligible for retry.
    #[serde(default = "default_status")]
    pub status: Vec<u16>,
}

fn default_enabled() -> bool {
    true
}

fn default_max() -> u32 {
    DEFAULT_RETRY_MAX
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_status() -> Vec<u16> {
    RETRY_STATUS_CODES.to_vec()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max: None,
            default_max: default_max(),
            delay_ms: default_delay_ms(),
            status: default_status(),
        }
    }
}

impl RetryConfig {
    /// Returns the base delay as a Duration.
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Budget handed to requests built from this configuration.
    pub fn budget(&self) -> RetryBudget {
        match (self.enabled, self.max) {
            (false, _) => RetryBudget::Disabled,
            (true, Some(max)) => RetryBudget::Max(max),
            (true, None) => RetryBudget::Default,
        }
    }
}
