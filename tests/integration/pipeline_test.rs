//! End-to-end tests for the enqueue → worker → tracker pipeline.

use photoflow_core::config::BatchConfig;
use photoflow_core::types::BatchStatus;
use photoflow_queue::service::EnqueueOptions;

use crate::helpers::{photo_files, TestApp};

#[tokio::test]
async fn batch_flows_from_queued_to_completed() {
    let app = TestApp::new();
    app.queue.start_worker().await;

    let outcome = app
        .queue
        .enqueue_batch_upload(
            photo_files(5),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    assert!(outcome.success);
    let batch_id = outcome.batch_id.unwrap();

    app.wait_for_status(&batch_id, BatchStatus::Completed).await;

    let history = app.tracker.status_history(&batch_id, None).await.unwrap();
    let statuses: Vec<BatchStatus> = history.iter().map(|r| r.to_status).collect();
    assert_eq!(
        statuses,
        vec![
            BatchStatus::Queued,
            BatchStatus::Processing,
            BatchStatus::Completed
        ]
    );
    let completion = history.last().unwrap();
    assert_eq!(completion.metadata.as_ref().unwrap()["processedFiles"], 5);

    let mut processed = app.processor.processed_files().await;
    processed.sort();
    assert_eq!(processed.len(), 5);

    app.queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_batch_is_retried_then_marked_failed() {
    let app = TestApp::new();
    app.processor.fail_file("photo_0.jpg").await;
    app.queue.start_worker().await;

    let outcome = app
        .queue
        .enqueue_batch_upload(
            photo_files(2),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    let batch_id = outcome.batch_id.unwrap();

    app.wait_for_status(&batch_id, BatchStatus::Failed).await;

    let history = app.tracker.status_history(&batch_id, None).await.unwrap();
    // Each failed attempt requeues until the budget runs out.
    let requeues = history
        .iter()
        .filter(|r| {
            r.to_status == BatchStatus::Queued
                && r.metadata
                    .as_ref()
                    .is_some_and(|m| m["retry"] == serde_json::Value::Bool(true))
        })
        .count();
    assert!(requeues >= 1);

    let failure = history
        .iter()
        .find(|r| r.to_status == BatchStatus::Failed)
        .unwrap();
    let metadata = failure.metadata.as_ref().unwrap();
    assert_eq!(metadata["failedFiles"], 1);
    assert!(metadata["reason"]
        .as_str()
        .unwrap()
        .starts_with("重試失敗: "));

    app.queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn retry_after_permanent_failure_is_denied() {
    let app = TestApp::new();
    app.processor.fail_file("photo_0.jpg").await;
    app.queue.start_worker().await;

    let outcome = app
        .queue
        .enqueue_batch_upload(
            photo_files(1),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    let batch_id = outcome.batch_id.unwrap();
    let job_id = outcome.job_id.unwrap();

    app.wait_for_status(&batch_id, BatchStatus::Failed).await;
    app.queue.shutdown().await.unwrap();

    let retry = app.queue.retry_failed_job(&job_id).await;
    assert!(!retry.success);
    assert_eq!(retry.error.unwrap(), "Maximum retry attempts exceeded");
}

#[tokio::test]
async fn worker_start_is_idempotent_and_shutdown_is_clean() {
    let app = TestApp::new();
    app.queue.start_worker().await;
    app.queue.start_worker().await;

    let outcome = app
        .queue
        .enqueue_batch_upload(
            photo_files(1),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    app.wait_for_status(&outcome.batch_id.unwrap(), BatchStatus::Completed)
        .await;

    app.queue.shutdown().await.unwrap();
    // The store is closed; health degrades instead of erroring.
    let health = app.queue.queue_health().await;
    assert!(!health.is_healthy);
    assert_eq!(health.connection_status, "disconnected");
}

#[tokio::test]
async fn priority_batches_are_claimed_before_normal_ones() {
    // Single worker so claim order is observable.
    let config = BatchConfig {
        max_concurrent_workers: 1,
        retry_delay_ms: 0,
        ..BatchConfig::for_environment("test")
    };
    let app = TestApp::with_config(config);

    let mut normal_ids = Vec::new();
    for _ in 0..3 {
        let outcome = app
            .queue
            .enqueue_batch_upload(
                photo_files(1),
                "project-1",
                "album-1",
                "user-1",
                EnqueueOptions::default(),
            )
            .await;
        normal_ids.push(outcome.batch_id.unwrap());
    }
    let urgent = app
        .queue
        .enqueue_batch_upload(
            photo_files(1),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions {
                priority: Some("urgent".to_string()),
            },
        )
        .await;
    let urgent_id = urgent.batch_id.unwrap();

    app.queue.start_worker().await;
    app.wait_for_status(&urgent_id, BatchStatus::Completed).await;
    for id in &normal_ids {
        app.wait_for_status(id, BatchStatus::Completed).await;
    }

    let urgent_done = app
        .tracker
        .status_history(&urgent_id, None)
        .await
        .unwrap()
        .last()
        .unwrap()
        .timestamp;
    let first_normal_done = app
        .tracker
        .status_history(&normal_ids[0], None)
        .await
        .unwrap()
        .last()
        .unwrap()
        .timestamp;
    assert!(urgent_done <= first_normal_done);

    app.queue.shutdown().await.unwrap();
}
