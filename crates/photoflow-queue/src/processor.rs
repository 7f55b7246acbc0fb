//! Chunked batch file processing.
//!
//! Files are processed in chunks of the requested concurrency. A chunk's
//! failures never abort later chunks; the only fail-fast path is the
//! memory-limit circuit breaker in the monitored variant, which stops
//! before a chunk starts, never mid-chunk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use photoflow_core::result::AppResult;
use photoflow_core::types::FileDescriptor;

use crate::memory::MemoryProbe;

/// Per-batch context handed to the file processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchContext {
    /// Owning project.
    pub project_id: String,
    /// Target album.
    pub album_id: String,
}

/// Processes a single file of a batch.
#[async_trait]
pub trait FileProcessor: Send + Sync + std::fmt::Debug {
    /// Process one file. Errors are isolated per file by the caller.
    async fn process(&self, file: &FileDescriptor, ctx: &BatchContext) -> AppResult<()>;
}

/// Retry policy for individual files within a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Retry budget; zero disables the retry.
    pub max_retries: u32,
    /// Delay before the retry, in milliseconds.
    pub retry_delay_ms: u64,
}

/// Request for [`BatchProcessor::process_batch_files`].
#[derive(Debug, Clone)]
pub struct BatchProcessRequest {
    /// Files to process.
    pub files: Vec<FileDescriptor>,
    /// Owning project.
    pub project_id: String,
    /// Target album.
    pub album_id: String,
    /// Files processed concurrently per chunk.
    pub concurrency: usize,
    /// Optional per-file retry policy.
    pub retry_options: Option<RetryOptions>,
}

/// Progress snapshot delivered after every file settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Files that have finished (success or failure).
    pub completed_files: usize,
    /// Total files in the batch.
    pub total_files: usize,
}

/// Callback invoked after each file settles in the monitored variant.
pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Resource ceilings for the monitored variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Abort the run once process memory usage exceeds this many bytes.
    pub max_memory_usage: u64,
}

/// Request for [`BatchProcessor::process_batch_with_monitoring`].
pub struct MonitoredBatchRequest {
    /// Files to process.
    pub files: Vec<FileDescriptor>,
    /// Owning project.
    pub project_id: String,
    /// Target album.
    pub album_id: String,
    /// Files processed concurrently per chunk.
    pub concurrency: usize,
    /// Resource ceilings checked before each chunk.
    pub resource_limits: ResourceLimits,
    /// Optional progress callback.
    pub progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for MonitoredBatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredBatchRequest")
            .field("files", &self.files.len())
            .field("concurrency", &self.concurrency)
            .field("resource_limits", &self.resource_limits)
            .finish()
    }
}

/// Outcome for a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    /// Original file name.
    pub file_name: String,
    /// Whether processing succeeded.
    pub success: bool,
    /// Error message on failure.
    pub error: Option<String>,
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// True iff zero files failed.
    pub success: bool,
    /// Count of files processed successfully.
    pub processed_files: usize,
    /// Count of files that failed.
    pub failed_files: usize,
    /// Per-file results in input order.
    pub results: Vec<FileResult>,
}

impl BatchOutcome {
    fn from_results(results: Vec<FileResult>) -> Self {
        let processed_files = results.iter().filter(|r| r.success).count();
        let failed_files = results.len() - processed_files;
        Self {
            success: failed_files == 0,
            processed_files,
            failed_files,
            results,
        }
    }
}

/// Runs batches of files through a [`FileProcessor`] in bounded chunks.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    processor: Arc<dyn FileProcessor>,
    probe: Arc<dyn MemoryProbe>,
}

impl BatchProcessor {
    /// Create a new batch processor.
    pub fn new(processor: Arc<dyn FileProcessor>, probe: Arc<dyn MemoryProbe>) -> Self {
        Self { processor, probe }
    }

    /// Process a batch in chunks of `concurrency` files.
    ///
    /// Per-file failures are retried once when `retry_options` allows, and
    /// never abort the rest of the batch.
    pub async fn process_batch_files(&self, request: BatchProcessRequest) -> BatchOutcome {
        let ctx = BatchContext {
            project_id: request.project_id,
            album_id: request.album_id,
        };
        let chunk_size = request.concurrency.max(1);
        let mut results: Vec<FileResult> = Vec::with_capacity(request.files.len());

        for chunk in request.files.chunks(chunk_size) {
            let chunk_results = join_all(chunk.iter().map(|file| {
                let ctx = ctx.clone();
                async move {
                    self.process_one(file, &ctx, request.retry_options).await
                }
            }))
            .await;
            results.extend(chunk_results);
        }

        let outcome = BatchOutcome::from_results(results);
        debug!(
            processed = outcome.processed_files,
            failed = outcome.failed_files,
            "Batch processing finished"
        );
        outcome
    }

    /// Process a batch with a memory circuit breaker and progress reporting.
    ///
    /// Memory is checked before each chunk; exceeding the limit marks every
    /// unprocessed file as failed and stops. In-flight work in the current
    /// chunk always settles first.
    pub async fn process_batch_with_monitoring(
        &self,
        request: MonitoredBatchRequest,
    ) -> BatchOutcome {
        let ctx = BatchContext {
            project_id: request.project_id,
            album_id: request.album_id,
        };
        let chunk_size = request.concurrency.max(1);
        let total_files = request.files.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let mut results: Vec<FileResult> = Vec::with_capacity(total_files);
        let mut chunks = request.files.chunks(chunk_size);

        loop {
            let used = self.probe.used_bytes();
            if used > request.resource_limits.max_memory_usage {
                let reason = format!(
                    "Batch aborted: memory usage {used} bytes exceeded limit {} bytes",
                    request.resource_limits.max_memory_usage
                );
                warn!(used, limit = request.resource_limits.max_memory_usage, "Memory limit breached");
                for file in chunks.by_ref().flatten() {
                    results.push(FileResult {
                        file_name: file.name.clone(),
                        success: false,
                        error: Some(reason.clone()),
                    });
                }
                break;
            }

            let Some(chunk) = chunks.next() else {
                break;
            };

            let chunk_results = join_all(chunk.iter().map(|file| {
                let ctx = ctx.clone();
                let completed = Arc::clone(&completed);
                let progress = request.progress.clone();
                async move {
                    let result = self.process_one(file, &ctx, None).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = progress {
                        callback(BatchProgress {
                            completed_files: done,
                            total_files,
                        });
                    }
                    result
                }
            }))
            .await;
            results.extend(chunk_results);
        }

        BatchOutcome::from_results(results)
    }

    async fn process_one(
        &self,
        file: &FileDescriptor,
        ctx: &BatchContext,
        retry_options: Option<RetryOptions>,
    ) -> FileResult {
        match self.processor.process(file, ctx).await {
            Ok(()) => FileResult {
                file_name: file.name.clone(),
                success: true,
                error: None,
            },
            Err(first_err) => {
                let retry = retry_options.filter(|r| r.max_retries > 0);
                let Some(retry) = retry else {
                    return FileResult {
                        file_name: file.name.clone(),
                        success: false,
                        error: Some(first_err.message),
                    };
                };

                tokio::time::sleep(Duration::from_millis(retry.retry_delay_ms)).await;
                match self.processor.process(file, ctx).await {
                    Ok(()) => FileResult {
                        file_name: file.name.clone(),
                        success: true,
                        error: None,
                    },
                    Err(retry_err) => FileResult {
                        file_name: file.name.clone(),
                        success: false,
                        error: Some(format!("重試失敗: {}", retry_err.message)),
                    },
                }
            }
        }
    }
}
