//! Integration tests for status tracking across the full pipeline.

use photoflow_core::types::BatchStatus;
use photoflow_queue::service::EnqueueOptions;
use photoflow_tracker::{ExportFormat, HistoryFilter};

use crate::helpers::{photo_files, TestApp};

#[tokio::test]
async fn global_statistics_reflect_worker_outcomes() {
    let app = TestApp::new();
    app.processor.fail_file("doomed.jpg").await;
    app.queue.start_worker().await;

    let ok = app
        .queue
        .enqueue_batch_upload(
            photo_files(2),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    let doomed = app
        .queue
        .enqueue_batch_upload(
            vec![photoflow_core::types::FileDescriptor::new(
                "doomed.jpg",
                512,
                "image/jpeg",
            )],
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;

    app.wait_for_status(&ok.batch_id.unwrap(), BatchStatus::Completed)
        .await;
    app.wait_for_status(&doomed.batch_id.unwrap(), BatchStatus::Failed)
        .await;
    app.queue.shutdown().await.unwrap();

    let stats = app.tracker.global_statistics(None).await.unwrap();
    assert_eq!(stats.total_batches, 2);
    assert!((stats.failure_rate - 0.5).abs() < f64::EPSILON);
    // The doomed batch is reprocessed once per retry, so the
    // queued-to-processing edge dominates.
    assert!(!stats.common_transitions.is_empty());
    assert_eq!(stats.common_transitions[0].to_status, BatchStatus::Processing);
    assert!(stats
        .common_failure_reasons
        .iter()
        .any(|r| r.reason.starts_with("重試失敗: ")));
}

#[tokio::test]
async fn exported_history_matches_the_recorded_pipeline() {
    let app = TestApp::new();
    app.queue.start_worker().await;

    let outcome = app
        .queue
        .enqueue_batch_upload(
            photo_files(3),
            "project-1",
            "album-1",
            "user-1",
            EnqueueOptions::default(),
        )
        .await;
    let batch_id = outcome.batch_id.unwrap();
    app.wait_for_status(&batch_id, BatchStatus::Completed).await;
    app.queue.shutdown().await.unwrap();

    let json = app
        .tracker
        .export_history(&batch_id, ExportFormat::Json)
        .await
        .unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(records.len(), 3);

    let csv = app
        .tracker
        .export_history(&batch_id, ExportFormat::Csv)
        .await
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "batchId,fromStatus,toStatus,timestamp,metadata");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with(&format!("{batch_id},,queued,")));
    assert!(lines[3].contains(",processing,completed,"));
}

#[tokio::test]
async fn history_filters_apply_to_worker_recorded_transitions() {
    let app = TestApp::new();
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
    app.wait_for_status(&batch_id, BatchStatus::Completed).await;
    app.queue.shutdown().await.unwrap();

    let terminal_only = app
        .tracker
        .status_history(
            &batch_id,
            Some(HistoryFilter {
                statuses: Some(vec![BatchStatus::Completed, BatchStatus::Failed]),
                ..HistoryFilter::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(terminal_only.len(), 1);
    assert_eq!(terminal_only[0].to_status, BatchStatus::Completed);

    let last_two = app
        .tracker
        .status_history(
            &batch_id,
            Some(HistoryFilter {
                limit: Some(2),
                ..HistoryFilter::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[0].to_status, BatchStatus::Processing);
}
