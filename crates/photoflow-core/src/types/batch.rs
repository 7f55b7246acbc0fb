//! Batch job model and derived job options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;

use super::status::BatchStatus;

/// Descriptor of a single uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Original file name as uploaded.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Declared MIME type.
    pub mime_type: String,
}

impl FileDescriptor {
    /// Create a new file descriptor.
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}

/// Retry backoff descriptor attached to job options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum BackoffPolicy {
    /// Delay doubles on each attempt, seeded from `delay_ms`.
    Exponential {
        /// Base delay in milliseconds.
        delay_ms: i64,
    },
    /// Constant delay between attempts.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: i64,
    },
}

impl BackoffPolicy {
    /// Delay before the given (1-based) retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> i64 {
        match self {
            Self::Exponential { delay_ms } => delay_ms.saturating_mul(1_i64 << attempt.min(16)),
            Self::Fixed { delay_ms } => *delay_ms,
        }
    }
}

/// Concrete queue options derived from a named priority tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Numeric priority weight (higher = more urgent).
    pub priority: u32,
    /// How many completed jobs the store retains.
    pub remove_on_complete: usize,
    /// How many failed jobs the store retains.
    pub remove_on_fail: usize,
    /// Maximum execution attempts.
    pub attempts: i64,
    /// Retry backoff descriptor.
    pub backoff: BackoffPolicy,
}

impl JobOptions {
    /// Build job options for a named priority tier.
    ///
    /// Unknown tier names fall back to `normal`.
    pub fn for_priority(name: &str, config: &BatchConfig) -> Self {
        Self {
            priority: config.priority_weight(name),
            remove_on_complete: config.cleanup.keep_completed,
            remove_on_fail: config.cleanup.keep_failed,
            attempts: config.retry_attempts.max(0) + 1,
            backoff: BackoffPolicy::Exponential {
                delay_ms: config.retry_delay_ms.max(0),
            },
        }
    }
}

/// Execution state of a job held by the queue store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a worker slot.
    Waiting,
    /// Currently executing.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed after all attempts.
    Failed,
}

/// A submitted batch upload job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Store-assigned job identifier.
    pub job_id: String,
    /// Process-unique batch identifier (`batch_<epochms>_<random>`).
    pub batch_id: String,
    /// Files to process.
    pub files: Vec<FileDescriptor>,
    /// Owning project.
    pub project_id: String,
    /// Target album.
    pub album_id: String,
    /// Submitting user.
    pub user_id: String,
    /// Derived queue options.
    pub options: JobOptions,
    /// Current execution state.
    pub state: JobState,
    /// Latest visible batch status.
    pub status: BatchStatus,
    /// Attempts made so far.
    pub attempts_made: i64,
    /// Error message from the most recent failure.
    pub error_message: Option<String>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_options_follow_the_priority_table() {
        let config = BatchConfig::default();
        let urgent = JobOptions::for_priority("urgent", &config);
        let normal = JobOptions::for_priority("normal", &config);
        let low = JobOptions::for_priority("low", &config);
        assert!(urgent.priority > normal.priority);
        assert!(normal.priority > low.priority);
        assert_eq!(urgent.attempts, config.retry_attempts + 1);
        assert_eq!(
            urgent.backoff,
            BackoffPolicy::Exponential {
                delay_ms: config.retry_delay_ms
            }
        );
    }

    #[test]
    fn unknown_priority_maps_to_normal() {
        let config = BatchConfig::default();
        let options = JobOptions::for_priority("someday", &config);
        assert_eq!(options.priority, config.priority_weight("normal"));
    }

    #[test]
    fn exponential_backoff_grows() {
        let backoff = BackoffPolicy::Exponential { delay_ms: 100 };
        assert_eq!(backoff.delay_for_attempt(1), 200);
        assert_eq!(backoff.delay_for_attempt(2), 400);
        assert!(backoff.delay_for_attempt(3) > backoff.delay_for_attempt(2));
    }
}
