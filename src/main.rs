//! PhotoFlow server — batch photo processing backend for the
//! construction project dashboard.
//!
//! Wires the queue, tracker and security services together and runs the
//! background worker until a shutdown signal arrives. Producers submit
//! jobs through the shared job store (Redis when the `redis-queue`
//! feature is enabled).

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use photoflow_core::clock::{Clock, SystemClock};
use photoflow_core::config::AppConfig;
use photoflow_core::error::AppError;
use photoflow_core::types::FileDescriptor;
use photoflow_queue::memory::ProcMemoryProbe;
use photoflow_queue::processor::{BatchContext, FileProcessor};
use photoflow_queue::service::BatchQueueService;
use photoflow_queue::store::JobStore;
use photoflow_security::{FileSecurityService, sanitize_file_name};
use photoflow_tracker::retention::RetentionTask;
use photoflow_tracker::store::MemoryStatusStore;
use photoflow_tracker::StatusTracker;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("PHOTOFLOW_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        "Starting PhotoFlow v{} (env: {})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── Step 1: Job store ────────────────────────────────────────
    let batch_config = config.batch_config();
    let store = build_job_store(&batch_config).await?;

    // ── Step 2: Status tracker + retention loop ──────────────────
    let tracker = Arc::new(StatusTracker::new(
        Arc::new(MemoryStatusStore::new()),
        config.tracker.clone(),
        Arc::clone(&clock),
    ));
    let retention_task = RetentionTask::spawn(Arc::clone(&tracker));
    tracing::info!("Status tracker initialized");

    // ── Step 3: File security service + rate-limit sweep ─────────
    let security = Arc::new(FileSecurityService::new(&config.security, Arc::clone(&clock))?);
    let sweep_task = security.start_sweep_task();

    // ── Step 4: Batch queue service + worker ─────────────────────
    let processor = Arc::new(PhotoIngestProcessor {
        max_file_size: config.security.max_file_size,
    });
    let queue = Arc::new(BatchQueueService::new(
        batch_config,
        store,
        processor,
        Arc::clone(&tracker),
        Arc::new(ProcMemoryProbe::new()),
    )?);
    queue.start_worker().await;
    tracing::info!("Batch queue worker started");

    let health = queue.queue_health().await;
    tracing::info!(
        waiting = health.waiting_jobs,
        active = health.active_jobs,
        failed = health.failed_jobs,
        connection = %health.connection_status,
        "Queue health at startup"
    );

    // ── Step 5: Wait for shutdown signal ─────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    queue.shutdown().await?;
    retention_task.destroy().await;
    sweep_task.destroy().await;

    tracing::info!("PhotoFlow server shut down gracefully");
    Ok(())
}

#[cfg(feature = "redis-queue")]
async fn build_job_store(
    batch_config: &photoflow_core::config::BatchConfig,
) -> Result<Arc<dyn JobStore>, AppError> {
    tracing::info!(
        host = %batch_config.redis.host,
        port = batch_config.redis.port,
        "Connecting to Redis job store..."
    );
    let store = photoflow_queue::store::RedisJobStore::connect(&batch_config.redis).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-queue"))]
async fn build_job_store(
    _batch_config: &photoflow_core::config::BatchConfig,
) -> Result<Arc<dyn JobStore>, AppError> {
    tracing::info!("Using in-memory job store");
    Ok(Arc::new(photoflow_queue::store::MemoryJobStore::new()))
}

/// Validates uploaded photo descriptors before they are accepted into an
/// album. Rejections surface as per-file failures in the batch outcome.
#[derive(Debug)]
struct PhotoIngestProcessor {
    max_file_size: u64,
}

#[async_trait::async_trait]
impl FileProcessor for PhotoIngestProcessor {
    async fn process(&self, file: &FileDescriptor, ctx: &BatchContext) -> Result<(), AppError> {
        if file.size == 0 {
            return Err(AppError::validation(format!("Empty file: {}", file.name)));
        }
        if file.size > self.max_file_size {
            return Err(AppError::validation(format!(
                "File exceeds maximum size: {} bytes",
                file.size
            )));
        }
        if !file.mime_type.starts_with("image/") && !file.mime_type.starts_with("video/") {
            return Err(AppError::validation(format!(
                "Unsupported media type: {}",
                file.mime_type
            )));
        }

        let stored_name = sanitize_file_name(&file.name);
        tracing::debug!(
            project_id = %ctx.project_id,
            album_id = %ctx.album_id,
            original = %file.name,
            stored = %stored_name,
            size = file.size,
            "Photo accepted"
        );
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
