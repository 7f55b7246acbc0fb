//! Worker runner — claims queued batch jobs and executes them.
//!
//! Concurrency is bounded two ways: a semaphore caps simultaneous jobs at
//! `max_concurrent_workers`, and an admission window caps job *starts* to
//! the same value within any fixed one-second window, so a drained queue
//! refilling all at once cannot burst past capacity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tracing::{error, info, trace, warn};

use photoflow_core::config::BatchConfig;
use photoflow_core::types::{BatchJob, BatchStatus};
use photoflow_tracker::StatusTracker;

use crate::processor::{BatchProcessRequest, BatchProcessor, RetryOptions};
use crate::store::JobStore;

/// Fixed-window admission control on task starts.
#[derive(Debug)]
struct AdmissionWindow {
    window: Duration,
    state: Mutex<(Instant, u32)>,
}

impl AdmissionWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Admit one start if fewer than `limit` have started in the current
    /// window; expired windows reset the counter.
    async fn try_admit(&self, limit: u32) -> bool {
        let mut state = self.state.lock().await;
        let (started_at, count) = *state;
        if started_at.elapsed() >= self.window {
            *state = (Instant::now(), 1);
            return true;
        }
        if count < limit {
            state.1 = count + 1;
            return true;
        }
        false
    }
}

/// Main worker loop: polls the store and executes claimed jobs.
#[derive(Debug)]
pub struct WorkerRunner {
    store: Arc<dyn JobStore>,
    processor: Arc<BatchProcessor>,
    tracker: Arc<StatusTracker>,
    config: Arc<RwLock<BatchConfig>>,
    admission: AdmissionWindow,
    poll_interval: Duration,
}

impl WorkerRunner {
    /// Create a new worker runner.
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<BatchProcessor>,
        tracker: Arc<StatusTracker>,
        config: Arc<RwLock<BatchConfig>>,
    ) -> Self {
        Self {
            store,
            processor,
            tracker,
            config,
            admission: AdmissionWindow::new(Duration::from_secs(1)),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Start the worker loop — runs until the cancel signal is received,
    /// then drains in-flight jobs before returning.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let max_workers = self.config.read().await.max_concurrent_workers;
        info!(concurrency = max_workers, "Batch worker started");

        let semaphore = Arc::new(Semaphore::new(max_workers as usize));

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("Batch worker received shutdown signal");
                        break;
                    }
                }
                _ = self.poll_and_execute(&semaphore) => {
                    tokio::select! {
                        _ = cancel.changed() => {
                            if *cancel.borrow() {
                                info!("Batch worker shutting down");
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        info!("Batch worker waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(
            Duration::from_secs(30),
            semaphore.acquire_many(max_workers),
        )
        .await;
        info!("Batch worker shut down complete");
    }

    async fn poll_and_execute(&self, semaphore: &Arc<Semaphore>) {
        let limit = self.config.read().await.max_concurrent_workers;
        if !self.admission.try_admit(limit).await {
            trace!("Admission window full, deferring job start");
            return;
        }

        let permit = match Arc::clone(semaphore).try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                trace!("All worker slots occupied");
                return;
            }
        };

        match self.store.claim_next().await {
            Ok(Some(job)) => {
                let store = Arc::clone(&self.store);
                let processor = Arc::clone(&self.processor);
                let tracker = Arc::clone(&self.tracker);
                let config = self.config.read().await.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    execute_job(store, processor, tracker, config, job).await;
                });
            }
            Ok(None) => {
                drop(permit);
                trace!("No jobs waiting");
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "Failed to claim job");
            }
        }
    }
}

/// Execute one claimed job end to end, recording status transitions.
async fn execute_job(
    store: Arc<dyn JobStore>,
    processor: Arc<BatchProcessor>,
    tracker: Arc<StatusTracker>,
    config: BatchConfig,
    job: BatchJob,
) {
    info!(
        job_id = %job.job_id,
        batch_id = %job.batch_id,
        files = job.files.len(),
        attempt = job.attempts_made,
        "Processing batch job"
    );

    if let Err(e) = tracker
        .track_status_change(
            &job.batch_id,
            Some(BatchStatus::Queued),
            BatchStatus::Processing,
            None,
        )
        .await
    {
        warn!(batch_id = %job.batch_id, error = %e, "Failed to record processing transition");
    }

    let outcome = processor
        .process_batch_files(BatchProcessRequest {
            files: job.files.clone(),
            project_id: job.project_id.clone(),
            album_id: job.album_id.clone(),
            concurrency: config.batch_size as usize,
            retry_options: Some(RetryOptions {
                max_retries: config.retry_attempts.max(0) as u32,
                retry_delay_ms: config.retry_delay_ms.max(0) as u64,
            }),
        })
        .await;

    if outcome.success {
        if let Err(e) = store.complete(&job.job_id).await {
            error!(job_id = %job.job_id, error = %e, "Failed to mark job completed");
        }
        let metadata = json!({
            "processedFiles": outcome.processed_files,
        });
        if let Err(e) = tracker
            .track_status_change(
                &job.batch_id,
                Some(BatchStatus::Processing),
                BatchStatus::Completed,
                Some(metadata),
            )
            .await
        {
            warn!(batch_id = %job.batch_id, error = %e, "Failed to record completion");
        }
        info!(job_id = %job.job_id, "Batch job completed");
        return;
    }

    let reason = outcome
        .results
        .iter()
        .find_map(|r| r.error.clone())
        .unwrap_or_else(|| "batch processing failed".to_string());

    if job.attempts_made < job.options.attempts {
        warn!(
            job_id = %job.job_id,
            attempt = job.attempts_made,
            max = job.options.attempts,
            "Batch job failed, requeuing"
        );
        if let Err(e) = store.requeue(&job.job_id).await {
            error!(job_id = %job.job_id, error = %e, "Failed to requeue job");
        }
        let metadata = json!({ "reason": reason, "retry": true });
        if let Err(e) = tracker
            .track_status_change(
                &job.batch_id,
                Some(BatchStatus::Processing),
                BatchStatus::Queued,
                Some(metadata),
            )
            .await
        {
            warn!(batch_id = %job.batch_id, error = %e, "Failed to record requeue");
        }
    } else {
        error!(job_id = %job.job_id, reason = %reason, "Batch job failed permanently");
        if let Err(e) = store.fail(&job.job_id, &reason).await {
            error!(job_id = %job.job_id, error = %e, "Failed to mark job failed");
        }
        let metadata = json!({
            "reason": reason,
            "failedFiles": outcome.failed_files,
        });
        if let Err(e) = tracker
            .track_status_change(
                &job.batch_id,
                Some(BatchStatus::Processing),
                BatchStatus::Failed,
                Some(metadata),
            )
            .await
        {
            warn!(batch_id = %job.batch_id, error = %e, "Failed to record failure");
        }
    }
}
