//! Job store abstraction over the queue backing store.
//!
//! The queue service only needs a store that supports priority ordering,
//! retry bookkeeping, and job introspection. The in-memory implementation
//! is the default; a Redis-backed store is available behind the
//! `redis-queue` feature.

mod memory;
#[cfg(feature = "redis-queue")]
mod redis;

pub use memory::MemoryJobStore;
#[cfg(feature = "redis-queue")]
pub use redis::RedisJobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use photoflow_core::result::AppResult;
use photoflow_core::types::BatchJob;

/// Counts of jobs by execution state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Jobs waiting for a worker slot.
    pub waiting: u64,
    /// Jobs currently executing.
    pub active: u64,
    /// Jobs that failed after all attempts.
    pub failed: u64,
}

/// Storage backend for queued batch jobs.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Submit a new job in the waiting state.
    async fn submit(&self, job: BatchJob) -> AppResult<()>;

    /// Claim the highest-priority waiting job, marking it active and
    /// incrementing its attempt counter. Returns `None` when the queue
    /// is empty.
    async fn claim_next(&self) -> AppResult<Option<BatchJob>>;

    /// Mark a job as completed.
    async fn complete(&self, job_id: &str) -> AppResult<()>;

    /// Mark a job as failed with an error message.
    async fn fail(&self, job_id: &str, error: &str) -> AppResult<()>;

    /// Move a failed job back to the waiting state for another attempt.
    async fn requeue(&self, job_id: &str) -> AppResult<()>;

    /// Look up a job by id.
    async fn get(&self, job_id: &str) -> AppResult<Option<BatchJob>>;

    /// Count jobs by execution state.
    async fn counts(&self) -> AppResult<JobCounts>;

    /// Check connectivity to the backing store.
    async fn ping(&self) -> AppResult<()>;

    /// Remove finished jobs beyond the retention counts or older than
    /// `max_age_ms`. Returns the number of jobs removed.
    async fn cleanup(
        &self,
        keep_completed: usize,
        keep_failed: usize,
        max_age_ms: i64,
    ) -> AppResult<usize>;

    /// Close the store connection.
    async fn close(&self) -> AppResult<()>;
}
