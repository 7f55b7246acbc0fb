//! Status tracker configuration.

use serde::{Deserialize, Serialize};

/// Status tracker retention and compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum status records kept per batch (and per file). Oldest entries
    /// are evicted when exceeded.
    #[serde(default = "default_max_history")]
    pub max_history_entries: usize,
    /// Record count at which a batch's history is compressed.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    /// How long records are retained, in milliseconds.
    #[serde(default = "default_retention")]
    pub retention_period_ms: i64,
    /// Interval between retention cleanup passes, in milliseconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_history_entries: default_max_history(),
            compression_threshold: default_compression_threshold(),
            retention_period_ms: default_retention(),
            cleanup_interval_ms: default_cleanup_interval(),
        }
    }
}

fn default_max_history() -> usize {
    100
}

fn default_compression_threshold() -> usize {
    50
}

fn default_retention() -> i64 {
    7 * 24 * 60 * 60 * 1000
}

fn default_cleanup_interval() -> u64 {
    60 * 60 * 1000
}
