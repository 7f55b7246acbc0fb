//! Batch queue service — the public entry point for batch uploads.
//!
//! Entry points that answer "did the operation run" (`enqueue_batch_upload`,
//! `queue_health`, `retry_failed_job`) trap internal errors and return
//! structured outcomes instead of propagating them.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use photoflow_core::config::BatchConfig;
use photoflow_core::error::AppError;
use photoflow_core::result::AppResult;
use photoflow_core::types::{BatchJob, BatchStatus, FileDescriptor, JobOptions, JobState};
use photoflow_tracker::StatusTracker;

use crate::memory::MemoryProbe;
use crate::processor::{
    BatchOutcome, BatchProcessRequest, BatchProcessor, FileProcessor, MonitoredBatchRequest,
};
use crate::runner::WorkerRunner;
use crate::store::JobStore;

/// Caller-supplied options for a batch enqueue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Named priority tier; defaults to `normal`.
    pub priority: Option<String>,
}

/// Outcome of a batch enqueue. Never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    /// Whether the batch was accepted.
    pub success: bool,
    /// Store-assigned job id on success.
    pub job_id: Option<String>,
    /// Generated batch id on success.
    pub batch_id: Option<String>,
    /// Error message on failure.
    pub error: Option<String>,
}

/// Queue health snapshot. Degrades to zeroed counts when the backing
/// store is unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Jobs waiting for a worker slot.
    pub waiting_jobs: u64,
    /// Jobs currently executing.
    pub active_jobs: u64,
    /// Jobs that failed after all attempts.
    pub failed_jobs: u64,
    /// `failed_jobs < 50` and the store answered the ping.
    pub is_healthy: bool,
    /// `"connected"` or `"disconnected"`.
    pub connection_status: String,
    /// Error message when disconnected.
    pub error: Option<String>,
}

/// Advisory concurrency recommendation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyAdvice {
    /// The configured concurrency.
    pub current_concurrency: u32,
    /// The recommended concurrency. Callers decide whether to apply it.
    pub recommended_concurrency: u32,
    /// Observed heap utilization fraction.
    pub heap_utilization: f64,
}

/// Outcome of a manual retry request. Never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOutcome {
    /// Whether the job was requeued.
    pub success: bool,
    /// The attempt number the retry will run as.
    pub retry_count: Option<i64>,
    /// Error message on failure.
    pub error: Option<String>,
}

/// Partial configuration overrides for `update_configuration`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfigOverrides {
    /// New worker concurrency.
    pub max_concurrent_workers: Option<u32>,
    /// New chunk size.
    pub batch_size: Option<u32>,
    /// New retry budget.
    pub retry_attempts: Option<i64>,
    /// New retry delay in milliseconds.
    pub retry_delay_ms: Option<i64>,
    /// New per-job timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Batch upload queue service.
#[derive(Debug)]
pub struct BatchQueueService {
    config: Arc<RwLock<BatchConfig>>,
    store: Arc<dyn JobStore>,
    processor: Arc<BatchProcessor>,
    tracker: Arc<StatusTracker>,
    probe: Arc<dyn MemoryProbe>,
    worker: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl BatchQueueService {
    /// Create a new queue service.
    ///
    /// Fails fast with a `Configuration` error listing every violation when
    /// the configuration does not validate.
    pub fn new(
        config: BatchConfig,
        store: Arc<dyn JobStore>,
        file_processor: Arc<dyn FileProcessor>,
        tracker: Arc<StatusTracker>,
        probe: Arc<dyn MemoryProbe>,
    ) -> AppResult<Self> {
        let violations = config.validate();
        if !violations.is_empty() {
            return Err(AppError::configuration(format!(
                "Invalid batch configuration: {}",
                violations.join("; ")
            )));
        }

        let processor = Arc::new(BatchProcessor::new(file_processor, Arc::clone(&probe)));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            processor,
            tracker,
            probe,
            worker: Mutex::new(None),
        })
    }

    /// Start the background worker. Idempotent; a second call is a no-op.
    pub async fn start_worker(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = WorkerRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.processor),
            Arc::clone(&self.tracker),
            Arc::clone(&self.config),
        );
        let handle = tokio::spawn(async move { runner.run(cancel_rx).await });
        *worker = Some((cancel_tx, handle));
    }

    /// Enqueue a batch of files for asynchronous processing.
    ///
    /// Returns promptly with identifiers for later polling; any internal
    /// error is captured in the outcome rather than propagated.
    pub async fn enqueue_batch_upload(
        &self,
        files: Vec<FileDescriptor>,
        project_id: &str,
        album_id: &str,
        user_id: &str,
        options: EnqueueOptions,
    ) -> EnqueueOutcome {
        match self
            .try_enqueue(files, project_id, album_id, user_id, options)
            .await
        {
            Ok((job_id, batch_id)) => EnqueueOutcome {
                success: true,
                job_id: Some(job_id),
                batch_id: Some(batch_id),
                error: None,
            },
            Err(e) => {
                error!(error = %e, "Batch enqueue failed");
                EnqueueOutcome {
                    success: false,
                    job_id: None,
                    batch_id: None,
                    error: Some(e.message),
                }
            }
        }
    }

    async fn try_enqueue(
        &self,
        files: Vec<FileDescriptor>,
        project_id: &str,
        album_id: &str,
        user_id: &str,
        options: EnqueueOptions,
    ) -> AppResult<(String, String)> {
        if files.is_empty() {
            return Err(AppError::validation("Batch contains no files"));
        }

        let config = self.config.read().await.clone();
        let priority = options.priority.as_deref().unwrap_or("normal");
        let job_options = JobOptions::for_priority(priority, &config);
        let batch_id = generate_batch_id();
        let job_id = uuid::Uuid::new_v4().to_string();

        let job = BatchJob {
            job_id: job_id.clone(),
            batch_id: batch_id.clone(),
            files,
            project_id: project_id.to_string(),
            album_id: album_id.to_string(),
            user_id: user_id.to_string(),
            options: job_options,
            state: JobState::Waiting,
            status: BatchStatus::Queued,
            attempts_made: 0,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        };

        self.store.submit(job).await?;
        if let Err(e) = self
            .tracker
            .track_status_change(&batch_id, None, BatchStatus::Queued, None)
            .await
        {
            warn!(batch_id = %batch_id, error = %e, "Failed to record enqueue transition");
        }

        info!(job_id = %job_id, batch_id = %batch_id, priority, "Batch enqueued");
        Ok((job_id, batch_id))
    }

    /// Process a batch synchronously. See [`BatchProcessor::process_batch_files`].
    pub async fn process_batch_files(&self, request: BatchProcessRequest) -> BatchOutcome {
        self.processor.process_batch_files(request).await
    }

    /// Process a batch with monitoring. See
    /// [`BatchProcessor::process_batch_with_monitoring`].
    pub async fn process_batch_with_monitoring(
        &self,
        request: MonitoredBatchRequest,
    ) -> BatchOutcome {
        self.processor.process_batch_with_monitoring(request).await
    }

    /// Queue health snapshot. Never an `Err`: store failures degrade to a
    /// disconnected report so dashboards keep rendering.
    pub async fn queue_health(&self) -> QueueHealth {
        match self.store.ping().await {
            Ok(()) => match self.store.counts().await {
                Ok(counts) => QueueHealth {
                    waiting_jobs: counts.waiting,
                    active_jobs: counts.active,
                    failed_jobs: counts.failed,
                    is_healthy: counts.failed < 50,
                    connection_status: "connected".to_string(),
                    error: None,
                },
                Err(e) => disconnected_health(e),
            },
            Err(e) => disconnected_health(e),
        }
    }

    /// Advisory concurrency adjustment based on heap utilization.
    pub async fn adjust_concurrency(&self) -> ConcurrencyAdvice {
        let current = self.config.read().await.max_concurrent_workers;
        let utilization = self.probe.utilization();
        let recommended = if utilization > 0.85 {
            current.saturating_sub(1).max(1)
        } else {
            current
        };
        ConcurrencyAdvice {
            current_concurrency: current,
            recommended_concurrency: recommended,
            heap_utilization: utilization,
        }
    }

    /// Requeue a failed job when its retry budget allows. Never an `Err`.
    pub async fn retry_failed_job(&self, job_id: &str) -> RetryOutcome {
        let job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return RetryOutcome {
                    success: false,
                    retry_count: None,
                    error: Some(format!("Job not found: {job_id}")),
                }
            }
            Err(e) => {
                return RetryOutcome {
                    success: false,
                    retry_count: None,
                    error: Some(e.message),
                }
            }
        };

        if job.attempts_made >= job.options.attempts {
            return RetryOutcome {
                success: false,
                retry_count: None,
                error: Some("Maximum retry attempts exceeded".to_string()),
            };
        }

        match self.store.requeue(job_id).await {
            Ok(()) => RetryOutcome {
                success: true,
                retry_count: Some(job.attempts_made + 1),
                error: None,
            },
            Err(e) => RetryOutcome {
                success: false,
                retry_count: None,
                error: Some(e.message),
            },
        }
    }

    /// Remove finished jobs beyond the retention policy. Returns the
    /// number removed.
    pub async fn cleanup_old_jobs(&self) -> AppResult<usize> {
        let cleanup = self.config.read().await.cleanup.clone();
        self.store
            .cleanup(cleanup.keep_completed, cleanup.keep_failed, cleanup.max_age_ms)
            .await
    }

    /// A defensive copy of the current configuration.
    pub async fn configuration(&self) -> BatchConfig {
        self.config.read().await.clone()
    }

    /// Merge overrides into the configuration and re-validate.
    ///
    /// Callers must serialize concurrent updates externally; the service
    /// provides no ordering between racing updates.
    pub async fn update_configuration(&self, overrides: BatchConfigOverrides) -> AppResult<()> {
        let mut merged = self.config.read().await.clone();
        if let Some(v) = overrides.max_concurrent_workers {
            merged.max_concurrent_workers = v;
        }
        if let Some(v) = overrides.batch_size {
            merged.batch_size = v;
        }
        if let Some(v) = overrides.retry_attempts {
            merged.retry_attempts = v;
        }
        if let Some(v) = overrides.retry_delay_ms {
            merged.retry_delay_ms = v;
        }
        if let Some(v) = overrides.timeout_ms {
            merged.timeout_ms = v;
        }

        let violations = merged.validate();
        if !violations.is_empty() {
            return Err(AppError::configuration(format!(
                "Invalid configuration update: {}",
                violations.join("; ")
            )));
        }

        *self.config.write().await = merged;
        info!("Batch configuration updated");
        Ok(())
    }

    /// Graceful teardown: stop the worker, drain in-flight jobs, close the
    /// backing store. All three complete before this returns.
    pub async fn shutdown(&self) -> AppResult<()> {
        if let Some((cancel_tx, handle)) = self.worker.lock().await.take() {
            let _ = cancel_tx.send(true);
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        self.store.close().await?;
        info!("Batch queue service shut down");
        Ok(())
    }
}

fn disconnected_health(e: AppError) -> QueueHealth {
    warn!(error = %e, "Queue backing store unreachable");
    QueueHealth {
        waiting_jobs: 0,
        active_jobs: 0,
        failed_jobs: 0,
        is_healthy: false,
        connection_status: "disconnected".to_string(),
        error: Some(e.message),
    }
}

/// Process-unique batch id: epoch milliseconds plus a random suffix.
fn generate_batch_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("batch_{}_{}", Utc::now().timestamp_millis(), suffix)
}
