//! In-memory job store.
//!
//! Default backend for tests and single-process deployments. Priority
//! ordering and retention mirror the Redis store's behavior.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use photoflow_core::error::AppError;
use photoflow_core::result::AppResult;
use photoflow_core::types::{BatchJob, JobState};

use super::{JobCounts, JobStore};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, BatchJob>,
    /// Waiting job ids in submission order; claim scans for the highest
    /// priority so that equal priorities remain FIFO.
    waiting: Vec<String>,
    closed: bool,
}

/// In-memory [`JobStore`] implementation.
#[derive(Debug, Default, Clone)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(inner: &Inner) -> AppResult<()> {
        if inner.closed {
            return Err(AppError::queue("Job store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn submit(&self, job: BatchJob) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        debug!(job_id = %job.job_id, batch_id = %job.batch_id, "Submitted job");
        inner.waiting.push(job.job_id.clone());
        inner.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn claim_next(&self) -> AppResult<Option<BatchJob>> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;

        let best = inner
            .waiting
            .iter()
            .enumerate()
            .max_by_key(|(idx, id)| {
                let priority = inner
                    .jobs
                    .get(*id)
                    .map(|j| j.options.priority)
                    .unwrap_or(0);
                // FIFO within a priority tier: earlier submissions win ties.
                (priority, std::cmp::Reverse(*idx))
            })
            .map(|(idx, _)| idx);

        let Some(idx) = best else {
            return Ok(None);
        };

        let job_id = inner.waiting.remove(idx);
        let job = match inner.jobs.get_mut(&job_id) {
            Some(job) => {
                job.state = JobState::Active;
                job.attempts_made += 1;
                job.clone()
            }
            None => return Ok(None),
        };
        Ok(Some(job))
    }

    async fn complete(&self, job_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Completed;
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Failed;
        job.error_message = Some(error.to_string());
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn requeue(&self, job_id: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Waiting;
        job.error_message = None;
        job.finished_at = None;
        inner.waiting.push(job_id.to_string());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> AppResult<Option<BatchJob>> {
        let inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        Ok(inner.jobs.get(job_id).cloned())
    }

    async fn counts(&self) -> AppResult<JobCounts> {
        let inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;
        let mut counts = JobCounts::default();
        for job in inner.jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Completed => {}
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> AppResult<()> {
        let inner = self.inner.lock().await;
        Self::ensure_open(&inner)
    }

    async fn cleanup(
        &self,
        keep_completed: usize,
        keep_failed: usize,
        max_age_ms: i64,
    ) -> AppResult<usize> {
        let mut inner = self.inner.lock().await;
        Self::ensure_open(&inner)?;

        let now = Utc::now();
        let mut removable: Vec<String> = Vec::new();

        for state in [JobState::Completed, JobState::Failed] {
            let keep = match state {
                JobState::Completed => keep_completed,
                _ => keep_failed,
            };
            let mut finished: Vec<(&String, chrono::DateTime<Utc>)> = inner
                .jobs
                .iter()
                .filter(|(_, j)| j.state == state)
                .map(|(id, j)| (id, j.finished_at.unwrap_or(j.created_at)))
                .collect();
            // Newest first; everything past the retention count goes.
            finished.sort_by(|a, b| b.1.cmp(&a.1));
            for (idx, (id, finished_at)) in finished.iter().enumerate() {
                let age_ms = (now - *finished_at).num_milliseconds();
                if idx >= keep || age_ms > max_age_ms {
                    removable.push((*id).clone());
                }
            }
        }

        let removed = removable.len();
        for id in removable {
            inner.jobs.remove(&id);
        }
        if removed > 0 {
            debug!(removed, "Cleaned up finished jobs");
        }
        Ok(removed)
    }

    async fn close(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        Ok(())
    }
}
