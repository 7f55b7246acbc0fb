//! File security configuration.

use serde::{Deserialize, Serialize};

/// File security service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Root directory for publicly served uploads. All validated paths must
    /// resolve inside this directory.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,
    /// Server secret used to sign download tokens.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    /// Download token lifetime in milliseconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_ms: i64,
    /// Maximum served file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Rate-limit window length in milliseconds.
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_ms: i64,
    /// Maximum requests per user per window.
    #[serde(default = "default_rate_max")]
    pub rate_limit_max_requests: u32,
    /// Interval between sweeps of expired rate-limit records, in milliseconds.
    #[serde(default = "default_sweep_interval")]
    pub rate_limit_sweep_interval_ms: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            token_secret: default_token_secret(),
            token_ttl_ms: default_token_ttl(),
            max_file_size: default_max_file_size(),
            rate_limit_window_ms: default_rate_window(),
            rate_limit_max_requests: default_rate_max(),
            rate_limit_sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_upload_root() -> String {
    "./public/uploads".to_string()
}

fn default_token_secret() -> String {
    "change-me".to_string()
}

fn default_token_ttl() -> i64 {
    60 * 60 * 1000
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_rate_window() -> i64 {
    15 * 60 * 1000
}

fn default_rate_max() -> u32 {
    100
}

fn default_sweep_interval() -> u64 {
    5 * 60 * 1000
}
