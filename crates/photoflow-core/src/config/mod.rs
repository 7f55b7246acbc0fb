//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod batch;
pub mod logging;
pub mod security;
pub mod tracker;

use serde::{Deserialize, Serialize};

pub use self::batch::{BatchConfig, CleanupConfig, Environment, RedisConfig};
pub use self::logging::LoggingConfig;
pub use self::security::SecurityConfig;
pub use self::tracker::TrackerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Runtime environment tier: `"development"`, `"test"`, `"production"`,
    /// or anything else for the defaults.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Batch queue tuning parameters.
    #[serde(default)]
    pub batch: Option<BatchConfig>,
    /// Status tracker settings.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// File security settings.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `PHOTOFLOW__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PHOTOFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let mut loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        if loaded.environment == default_environment() {
            loaded.environment = env.to_string();
        }
        Ok(loaded)
    }

    /// The effective batch configuration: the file-supplied section when
    /// present, otherwise the preset for the configured environment.
    pub fn batch_config(&self) -> BatchConfig {
        self.batch
            .clone()
            .unwrap_or_else(|| BatchConfig::for_environment(&self.environment))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            batch: None,
            tracker: TrackerConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "default".to_string()
}
