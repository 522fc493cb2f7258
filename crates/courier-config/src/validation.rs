//! Configuration validation module.
//!
//! Collects every problem in a configuration instead of stopping at the
//! first, so a bad deployment reports all of them at once.

use crate::ClientConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Worker limit must be at least one.
    InvalidWorker { value: usize },
    /// Retry delay exceeds the allowed maximum.
    DelayTooLarge { value: u64, maximum: u64 },
    /// Retry status is not an HTTP status code.
    InvalidStatus { value: u16 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWorker { value } => {
                write!(f, "Invalid queue.worker: {value} (must be at least 1)")
            }
            Self::DelayTooLarge { value, maximum } => {
                write!(f, "retry.delay_ms {value} exceeds maximum allowed ({maximum})")
            }
            Self::InvalidStatus { value } => {
                write!(f, "Invalid retry status: {value} (must be between 100 and 599)")
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {url_type} URL: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// One hour.
    const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

    /// Validates the entire client configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &ClientConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        if config.queue.worker == 0 {
            errors.push(ConfigValidationError::InvalidWorker {
                value: config.queue.worker,
            });
        }

        if config.retry.delay_ms > Self::MAX_DELAY_MS {
            errors.push(ConfigValidationError::DelayTooLarge {
                value: config.retry.delay_ms,
                maximum: Self::MAX_DELAY_MS,
            });
        }

        errors.extend(
            config
                .retry
                .status
                .iter()
                .filter(|status| !(100..=599).contains(*status))
                .map(|&value| ConfigValidationError::InvalidStatus { value }),
        );

        if let Some(ref base_url) = config.client.base_url {
            if let Err(e) = Url::parse(base_url) {
                errors.push(ConfigValidationError::InvalidUrl {
                    url_type: "base".to_string(),
                    message: format!("{base_url}: {e}"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
