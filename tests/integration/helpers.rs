//! Shared test helpers for integration tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use photoflow_core::clock::SystemClock;
use photoflow_core::config::{BatchConfig, TrackerConfig};
use photoflow_core::error::AppError;
use photoflow_core::types::{BatchStatus, FileDescriptor};
use photoflow_queue::memory::FixedMemoryProbe;
use photoflow_queue::processor::{BatchContext, FileProcessor};
use photoflow_queue::service::BatchQueueService;
use photoflow_queue::store::MemoryJobStore;
use photoflow_tracker::{MemoryStatusStore, StatusTracker};

/// Processor that records which files it saw and fails the names it was
/// told to fail.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    processed: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingProcessor {
    pub async fn fail_file(&self, name: &str) {
        self.failing.lock().await.insert(name.to_string());
    }

    pub async fn processed_files(&self) -> Vec<String> {
        self.processed.lock().await.clone()
    }
}

#[async_trait]
impl FileProcessor for RecordingProcessor {
    async fn process(&self, file: &FileDescriptor, _ctx: &BatchContext) -> Result<(), AppError> {
        if self.failing.lock().await.contains(&file.name) {
            return Err(AppError::internal(format!(
                "simulated failure: {}",
                file.name
            )));
        }
        self.processed.lock().await.push(file.name.clone());
        Ok(())
    }
}

/// Test application context wiring the queue and tracker together.
pub struct TestApp {
    pub queue: Arc<BatchQueueService>,
    pub tracker: Arc<StatusTracker>,
    pub processor: Arc<RecordingProcessor>,
}

impl TestApp {
    /// Create a queue + tracker stack with instant retries.
    pub fn new() -> Self {
        let config = BatchConfig {
            retry_delay_ms: 0,
            ..BatchConfig::for_environment("test")
        };
        Self::with_config(config)
    }

    pub fn with_config(config: BatchConfig) -> Self {
        let tracker = Arc::new(StatusTracker::new(
            Arc::new(MemoryStatusStore::new()),
            TrackerConfig::default(),
            Arc::new(SystemClock),
        ));
        let processor = Arc::new(RecordingProcessor::default());
        let queue = Arc::new(
            BatchQueueService::new(
                config,
                Arc::new(MemoryJobStore::new()),
                Arc::clone(&processor) as Arc<dyn FileProcessor>,
                Arc::clone(&tracker),
                FixedMemoryProbe::with_readings(0, 1_000),
            )
            .expect("queue service construction"),
        );
        Self {
            queue,
            tracker,
            processor,
        }
    }

    /// Poll the tracker until the batch reaches the given status.
    pub async fn wait_for_status(&self, batch_id: &str, status: BatchStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let history = self
                .tracker
                .status_history(batch_id, None)
                .await
                .expect("status history");
            if history.iter().any(|r| r.to_status == status) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("batch {batch_id} never reached {status}; history: {history:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn photo_files(count: usize) -> Vec<FileDescriptor> {
    (0..count)
        .map(|i| FileDescriptor::new(format!("photo_{i}.jpg"), 1_024, "image/jpeg"))
        .collect()
}
