//! Configuration loader with layered sources.

use crate::{format_validation_errors, ClientConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use courier_core::{ApiError, ApiResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Variable naming the environment-specific layer.
pub const ENVIRONMENT_VAR: &str = "COURIER_ENVIRONMENT";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<ClientConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `COURIER_` prefix
    pub fn new(config_dir: impl Into<String>) -> ApiResult<Self> {
        let config_dir = config_dir.into();
        let config = Self::load(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> ApiResult<Self> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> ClientConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// Clients already built keep their pipeline; only clients created
    /// afterwards see the new values.
    pub async fn reload(&self) -> ApiResult<()> {
        let new_config = Self::load(&self.config_dir)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Gets a specific configuration value by dotted key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }

    /// Loads and validates configuration from `config_dir` and the process
    /// environment.
    pub fn load(config_dir: &str) -> ApiResult<ClientConfig> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::load_layers(config_dir, &environment, None)
    }

    /// Builds the layered configuration. `env_source` replaces the process
    /// environment when given.
    fn load_layers(
        config_dir: &str,
        environment: &str,
        env_source: Option<HashMap<String, String>>,
    ) -> ApiResult<ClientConfig> {
        info!("Loading client configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for layer in ["default", environment, "local"] {
            let path = format!("{config_dir}/{layer}.toml");
            if Path::new(&path).exists() {
                debug!("Loading config layer from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COURIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("retry.status")
                .source(env_source),
        );

        let config: ClientConfig = builder
            .build()
            .and_then(Config::try_deserialize::<ClientConfig>)
            .map_err(config_error_to_api_error)?;

        ConfigValidator::validate(&config)
            .map_err(|errors| ApiError::Configuration(format_validation_errors(&errors)))?;

        Ok(config)
    }
}

fn config_error_to_api_error(err: ConfigError) -> ApiError {
    ApiError::Configuration(err.to_string())
}
