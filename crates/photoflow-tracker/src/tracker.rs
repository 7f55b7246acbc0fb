//! The status tracker service.
//!
//! A pure recorder: it never retries and never suppresses a validation
//! failure. Status values are validated for membership in the closed set;
//! transition legality is deliberately not enforced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use photoflow_core::clock::Clock;
use photoflow_core::config::TrackerConfig;
use photoflow_core::result::AppResult;
use photoflow_core::types::BatchStatus;

use crate::statistics::{batch_statistics, global_statistics, BatchStatistics, GlobalStatistics};
use crate::store::{StatusRecord, StatusStore};

/// Narrowing options for [`StatusTracker::status_history`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    /// Keep records at or after this time.
    pub start_date: Option<DateTime<Utc>>,
    /// Keep records at or before this time.
    pub end_date: Option<DateTime<Utc>>,
    /// Keep records whose `to_status` is one of these.
    pub statuses: Option<Vec<BatchStatus>>,
    /// Keep only the last `limit` records after the other filters.
    pub limit: Option<usize>,
}

/// Export encoding for [`StatusTracker::export_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Raw record array.
    Json,
    /// Header row plus one row per record, metadata JSON-quoted.
    Csv,
}

/// Records batch and per-file status transitions.
#[derive(Debug)]
pub struct StatusTracker {
    store: Arc<dyn StatusStore>,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
}

impl StatusTracker {
    /// Create a tracker over the given store.
    pub fn new(store: Arc<dyn StatusStore>, config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub(crate) fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record a batch-level status transition.
    ///
    /// Appends are capped at `max_history_entries` (oldest evicted) and
    /// the history is compressed once it reaches the compression
    /// threshold.
    pub async fn track_status_change(
        &self,
        batch_id: &str,
        from_status: Option<BatchStatus>,
        to_status: BatchStatus,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let record = StatusRecord {
            batch_id: batch_id.to_string(),
            from_status,
            to_status,
            timestamp: self.clock.now(),
            metadata,
        };
        debug!(batch_id, from = ?from_status, to = %to_status, "Status transition");

        let len = self
            .store
            .append_batch(record, self.config.max_history_entries)
            .await?;
        if len >= self.config.compression_threshold {
            self.perform_compression(batch_id).await?;
        }
        Ok(())
    }

    /// Record a file-level status transition under `(batch_id, file_id)`.
    /// Cap and compression semantics match the batch-level operation.
    pub async fn track_file_status_change(
        &self,
        batch_id: &str,
        file_id: &str,
        from_status: Option<BatchStatus>,
        to_status: BatchStatus,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let record = StatusRecord {
            batch_id: batch_id.to_string(),
            from_status,
            to_status,
            timestamp: self.clock.now(),
            metadata,
        };
        let len = self
            .store
            .append_file(file_id, record, self.config.max_history_entries)
            .await?;
        if len >= self.config.compression_threshold {
            let records = self.store.file_history(batch_id, file_id).await?;
            let compressed = compress_records(&records);
            debug!(
                batch_id,
                file_id,
                before = records.len(),
                after = compressed.len(),
                "Compressed file status history"
            );
            self.store
                .replace_file_history(batch_id, file_id, compressed)
                .await?;
        }
        Ok(())
    }

    /// Ordered status history for a batch, optionally filtered.
    pub async fn status_history(
        &self,
        batch_id: &str,
        filter: Option<HistoryFilter>,
    ) -> AppResult<Vec<StatusRecord>> {
        let mut records = self.store.batch_history(batch_id).await?;
        let Some(filter) = filter else {
            return Ok(records);
        };

        if let Some(start) = filter.start_date {
            records.retain(|r| r.timestamp >= start);
        }
        if let Some(end) = filter.end_date {
            records.retain(|r| r.timestamp <= end);
        }
        if let Some(statuses) = &filter.statuses {
            records.retain(|r| statuses.contains(&r.to_status));
        }
        if let Some(limit) = filter.limit {
            if records.len() > limit {
                records.drain(..records.len() - limit);
            }
        }
        Ok(records)
    }

    /// Ordered file-level history; empty when untracked.
    pub async fn file_status_history(
        &self,
        batch_id: &str,
        file_id: &str,
    ) -> AppResult<Vec<StatusRecord>> {
        self.store.file_history(batch_id, file_id).await
    }

    /// Time-in-status statistics for one batch. Zero-filled when the
    /// batch has no history.
    pub async fn status_statistics(&self, batch_id: &str) -> AppResult<BatchStatistics> {
        let records = self.store.batch_history(batch_id).await?;
        Ok(batch_statistics(&records))
    }

    /// Failure-pattern analytics across every tracked batch, optionally
    /// restricted to a date window.
    pub async fn global_statistics(
        &self,
        filter: Option<HistoryFilter>,
    ) -> AppResult<GlobalStatistics> {
        let mut histories = Vec::new();
        for batch_id in self.store.batch_ids().await? {
            let history = self.status_history(&batch_id, filter.clone()).await?;
            histories.push((batch_id, history));
        }
        Ok(global_statistics(&histories))
    }

    /// Export a batch's history as a JSON array or CSV document.
    pub async fn export_history(
        &self,
        batch_id: &str,
        format: ExportFormat,
    ) -> AppResult<String> {
        let records = self.store.batch_history(batch_id).await?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string(&records)?),
            ExportFormat::Csv => {
                let mut out = String::from("batchId,fromStatus,toStatus,timestamp,metadata\n");
                for record in &records {
                    let metadata = match &record.metadata {
                        Some(value) => csv_quote(&serde_json::to_string(value)?),
                        None => String::new(),
                    };
                    out.push_str(&format!(
                        "{},{},{},{},{}\n",
                        record.batch_id,
                        record
                            .from_status
                            .map(|s| s.as_str())
                            .unwrap_or_default(),
                        record.to_status,
                        record.timestamp.to_rfc3339(),
                        metadata,
                    ));
                }
                Ok(out)
            }
        }
    }

    /// Compress a batch's history: keep the first record, the last record,
    /// and significant interior records. No-op below the compression
    /// threshold. Lossy and one-way.
    pub async fn perform_compression(&self, batch_id: &str) -> AppResult<()> {
        let records = self.store.batch_history(batch_id).await?;
        if records.len() < self.config.compression_threshold {
            return Ok(());
        }

        let compressed = compress_records(&records);
        debug!(
            batch_id,
            before = records.len(),
            after = compressed.len(),
            "Compressed status history"
        );
        self.store.replace_batch_history(batch_id, compressed).await
    }

    /// Purge records older than the retention period. Returns the number
    /// of records removed. Called by the retention task; exposed for
    /// explicit invocation.
    pub async fn run_retention_cycle(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - chrono::Duration::milliseconds(self.config.retention_period_ms);
        let removed = self.store.purge_older_than(cutoff).await?;
        if removed > 0 {
            debug!(removed, "Retention cycle purged records");
        }
        Ok(removed)
    }
}

/// CSV-quote a field, doubling interior quotes.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Keep the first record, the last record, and significant interior
/// records.
fn compress_records(records: &[StatusRecord]) -> Vec<StatusRecord> {
    let last_idx = records.len().saturating_sub(1);
    records
        .iter()
        .enumerate()
        .filter(|(idx, record)| *idx == 0 || *idx == last_idx || record.is_significant())
        .map(|(_, record)| record.clone())
        .collect()
}
