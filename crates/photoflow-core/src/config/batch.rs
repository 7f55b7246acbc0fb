//! Batch queue configuration with environment-tier presets.
//!
//! The queue service refuses to start on a non-empty violation list, so
//! validation reports every problem at once rather than failing on the
//! first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Runtime environment tier selecting a configuration preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development and automated tests.
    Development,
    /// Production deployment.
    Production,
    /// Fallback tier for unrecognized values.
    Default,
}

impl Environment {
    /// Parse an environment name, falling back to [`Environment::Default`].
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Self::Development,
            "production" | "prod" => Self::Production,
            _ => Self::Default,
        }
    }
}

/// Batch queue tuning parameters.
///
/// Immutable per instance once handed to the queue service; updates go
/// through `BatchQueueService::update_configuration`, which re-validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of jobs processed simultaneously.
    #[serde(default = "default_workers")]
    pub max_concurrent_workers: u32,
    /// Number of files processed concurrently within one chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Maximum retry attempts per job. Signed so that a negative value
    /// arriving from the environment is reported rather than wrapped.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: i64,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: i64,
    /// Per-job timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Named priority tiers mapped to numeric weights (higher = more urgent).
    #[serde(default = "default_priority_levels")]
    pub priority_levels: HashMap<String, u32>,
    /// Connection parameters for the queue backing store.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Completed/failed job retention policy.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Queue backing store connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host name.
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// Redis port.
    #[serde(default = "default_redis_port")]
    pub port: u32,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Database index.
    #[serde(default)]
    pub db: u32,
    /// Key prefix for all PhotoFlow queue keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            key_prefix: default_key_prefix(),
        }
    }
}

/// Retention policy for finished jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How many completed jobs to keep.
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    /// How many failed jobs to keep.
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
    /// Maximum age of a finished job in milliseconds.
    #[serde(default = "default_max_age")]
    pub max_age_ms: i64,
    /// Interval between cleanup passes in milliseconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            max_age_ms: default_max_age(),
            cleanup_interval_ms: default_cleanup_interval(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_workers(),
            batch_size: default_batch_size(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            timeout_ms: default_timeout(),
            priority_levels: default_priority_levels(),
            redis: RedisConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Configuration preset for a named environment tier.
    ///
    /// Unrecognized names fall back to the defaults.
    pub fn for_environment(name: &str) -> Self {
        match Environment::from_name(name) {
            Environment::Development => Self {
                max_concurrent_workers: 2,
                batch_size: 3,
                retry_attempts: 2,
                retry_delay_ms: 500,
                cleanup: CleanupConfig {
                    keep_completed: 10,
                    keep_failed: 10,
                    max_age_ms: 60 * 60 * 1000,
                    cleanup_interval_ms: 10 * 60 * 1000,
                },
                ..Self::default()
            },
            Environment::Production => Self {
                max_concurrent_workers: 8,
                batch_size: 15,
                timeout_ms: 60_000,
                cleanup: CleanupConfig {
                    keep_completed: 500,
                    keep_failed: 200,
                    max_age_ms: 7 * 24 * 60 * 60 * 1000,
                    cleanup_interval_ms: 60 * 60 * 1000,
                },
                ..Self::default()
            },
            Environment::Default => Self::default(),
        }
    }

    /// Validate the configuration, returning every violation found.
    ///
    /// An empty list means the configuration is usable. Callers must check
    /// before constructing the queue service; construction fails fast on a
    /// non-empty list.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.max_concurrent_workers < 1 {
            violations.push("max_concurrent_workers must be at least 1".to_string());
        }
        if self.batch_size < 1 {
            violations.push("batch_size must be at least 1".to_string());
        }
        if self.retry_attempts < 0 {
            violations.push("retry_attempts must not be negative".to_string());
        }
        if self.retry_delay_ms < 0 {
            violations.push("retry_delay_ms must not be negative".to_string());
        }
        if self.timeout_ms < 1000 {
            violations.push("timeout_ms must be at least 1000".to_string());
        }
        if self.redis.host.trim().is_empty() {
            violations.push("redis.host must not be empty".to_string());
        }
        if self.redis.port < 1 || self.redis.port > 65_535 {
            violations.push("redis.port must be between 1 and 65535".to_string());
        }

        violations
    }

    /// Numeric weight for a named priority tier, falling back to `normal`.
    pub fn priority_weight(&self, name: &str) -> u32 {
        self.priority_levels
            .get(name)
            .or_else(|| self.priority_levels.get("normal"))
            .copied()
            .unwrap_or(5)
    }
}

fn default_workers() -> u32 {
    5
}

fn default_batch_size() -> u32 {
    10
}

fn default_retry_attempts() -> i64 {
    3
}

fn default_retry_delay() -> i64 {
    2000
}

fn default_timeout() -> u64 {
    30_000
}

fn default_priority_levels() -> HashMap<String, u32> {
    HashMap::from([
        ("urgent".to_string(), 10),
        ("normal".to_string(), 5),
        ("low".to_string(), 1),
    ])
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u32 {
    6379
}

fn default_key_prefix() -> String {
    "photoflow:".to_string()
}

fn default_keep_completed() -> usize {
    100
}

fn default_keep_failed() -> usize {
    50
}

fn default_max_age() -> i64 {
    24 * 60 * 60 * 1000
}

fn default_cleanup_interval() -> u64 {
    60 * 60 * 1000
}
