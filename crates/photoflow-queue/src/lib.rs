//! Background batch processing for PhotoFlow.
//!
//! This crate provides:
//! - A job store abstraction over the queue backing store (in-memory by
//!   default, Redis behind the `redis-queue` feature)
//! - The batch queue service: enqueue, health, retry, cleanup, shutdown
//! - A worker runner with bounded concurrency and admission control
//! - Chunked batch file processing with retry and resource monitoring

pub mod memory;
pub mod processor;
pub mod runner;
pub mod service;
pub mod store;

pub use memory::{FixedMemoryProbe, MemoryProbe, ProcMemoryProbe};
pub use processor::{
    BatchContext, BatchOutcome, BatchProcessRequest, BatchProcessor, BatchProgress, FileProcessor,
    FileResult, MonitoredBatchRequest, ResourceLimits, RetryOptions,
};
pub use runner::WorkerRunner;
pub use service::{
    BatchConfigOverrides, BatchQueueService, ConcurrencyAdvice, EnqueueOptions, EnqueueOutcome,
    QueueHealth, RetryOutcome,
};
pub use store::{JobStore, MemoryJobStore};
