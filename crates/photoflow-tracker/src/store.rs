//! Status record storage.
//!
//! The tracker's public contract is independent of where records live; a
//! production deployment can back it with a database by implementing
//! [`StatusStore`]. The in-memory implementation is the default and is
//! what tests use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use photoflow_core::result::AppResult;
use photoflow_core::types::BatchStatus;

/// A single status transition fact. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Batch this record belongs to.
    pub batch_id: String,
    /// Previous status; `None` marks the initial record.
    pub from_status: Option<BatchStatus>,
    /// New status.
    pub to_status: BatchStatus,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional free-form context (failure reason, significance flag, ...).
    pub metadata: Option<serde_json::Value>,
}

impl StatusRecord {
    /// Whether this record must survive compression: terminal-failure
    /// states and records explicitly flagged significant.
    pub fn is_significant(&self) -> bool {
        if matches!(self.to_status, BatchStatus::Failed | BatchStatus::Cancelled) {
            return true;
        }
        self.metadata
            .as_ref()
            .and_then(|m| m.get("significant"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Storage backend for status records.
#[async_trait]
pub trait StatusStore: Send + Sync + std::fmt::Debug {
    /// Append a batch-level record, evicting the oldest entry when the
    /// cap is exceeded. Returns the history length after the append.
    async fn append_batch(&self, record: StatusRecord, cap: usize) -> AppResult<usize>;

    /// Append a file-level record under `(batch_id, file_id)` with the
    /// same cap semantics.
    async fn append_file(
        &self,
        file_id: &str,
        record: StatusRecord,
        cap: usize,
    ) -> AppResult<usize>;

    /// Ordered batch-level history; empty when untracked.
    async fn batch_history(&self, batch_id: &str) -> AppResult<Vec<StatusRecord>>;

    /// Ordered file-level history; empty when untracked.
    async fn file_history(&self, batch_id: &str, file_id: &str) -> AppResult<Vec<StatusRecord>>;

    /// Replace a batch's history wholesale (compression).
    async fn replace_batch_history(
        &self,
        batch_id: &str,
        records: Vec<StatusRecord>,
    ) -> AppResult<()>;

    /// Replace one file's history wholesale (compression).
    async fn replace_file_history(
        &self,
        batch_id: &str,
        file_id: &str,
        records: Vec<StatusRecord>,
    ) -> AppResult<()>;

    /// All batch ids with at least one record.
    async fn batch_ids(&self) -> AppResult<Vec<String>>;

    /// Drop records older than `cutoff` and delete emptied containers.
    /// Returns the number of records removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;
}

#[derive(Debug, Default)]
struct Inner {
    /// Batch histories in insertion order per batch.
    batches: HashMap<String, Vec<StatusRecord>>,
    /// File histories keyed by `(batch_id, file_id)`.
    files: HashMap<String, HashMap<String, Vec<StatusRecord>>>,
}

/// In-memory [`StatusStore`] implementation.
#[derive(Debug, Default, Clone)]
pub struct MemoryStatusStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_capped(records: &mut Vec<StatusRecord>, record: StatusRecord, cap: usize) -> usize {
    records.push(record);
    while records.len() > cap {
        records.remove(0);
    }
    records.len()
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn append_batch(&self, record: StatusRecord, cap: usize) -> AppResult<usize> {
        let mut inner = self.inner.write().await;
        let records = inner.batches.entry(record.batch_id.clone()).or_default();
        Ok(push_capped(records, record, cap))
    }

    async fn append_file(
        &self,
        file_id: &str,
        record: StatusRecord,
        cap: usize,
    ) -> AppResult<usize> {
        let mut inner = self.inner.write().await;
        let records = inner
            .files
            .entry(record.batch_id.clone())
            .or_default()
            .entry(file_id.to_string())
            .or_default();
        Ok(push_capped(records, record, cap))
    }

    async fn batch_history(&self, batch_id: &str) -> AppResult<Vec<StatusRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.batches.get(batch_id).cloned().unwrap_or_default())
    }

    async fn file_history(&self, batch_id: &str, file_id: &str) -> AppResult<Vec<StatusRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .files
            .get(batch_id)
            .and_then(|files| files.get(file_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_batch_history(
        &self,
        batch_id: &str,
        records: Vec<StatusRecord>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.batches.insert(batch_id.to_string(), records);
        Ok(())
    }

    async fn replace_file_history(
        &self,
        batch_id: &str,
        file_id: &str,
        records: Vec<StatusRecord>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .files
            .entry(batch_id.to_string())
            .or_default()
            .insert(file_id.to_string(), records);
        Ok(())
    }

    async fn batch_ids(&self) -> AppResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.batches.keys().cloned().collect())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut inner = self.inner.write().await;
        let mut removed = 0usize;

        inner.batches.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.timestamp >= cutoff);
            removed += before - records.len();
            !records.is_empty()
        });

        inner.files.retain(|_, files| {
            files.retain(|_, records| {
                let before = records.len();
                records.retain(|r| r.timestamp >= cutoff);
                removed += before - records.len();
                !records.is_empty()
            });
            !files.is_empty()
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(batch_id: &str, to: BatchStatus, millis: i64) -> StatusRecord {
        StatusRecord {
            batch_id: batch_id.to_string(),
            from_status: None,
            to_status: to,
            timestamp: chrono::TimeZone::timestamp_millis_opt(&Utc, millis).unwrap(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn append_evicts_oldest_beyond_cap() {
        let store = MemoryStatusStore::new();
        for i in 0..5 {
            store
                .append_batch(record("b1", BatchStatus::Queued, i), 3)
                .await
                .unwrap();
        }
        let history = store.batch_history("b1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp.timestamp_millis(), 2);
        assert_eq!(history[2].timestamp.timestamp_millis(), 4);
    }

    #[tokio::test]
    async fn purge_removes_empty_containers() {
        let store = MemoryStatusStore::new();
        store
            .append_batch(record("old", BatchStatus::Queued, 100), 10)
            .await
            .unwrap();
        store
            .append_batch(record("new", BatchStatus::Queued, 5_000), 10)
            .await
            .unwrap();
        store
            .append_file("f1", record("old", BatchStatus::Queued, 100), 10)
            .await
            .unwrap();

        let cutoff = chrono::TimeZone::timestamp_millis_opt(&Utc, 1_000).unwrap();
        let removed = store.purge_older_than(cutoff).await.unwrap();
        assert_eq!(removed, 2);

        let mut ids = store.batch_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["new"]);
        assert!(store.file_history("old", "f1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn significance_rules() {
        let mut r = record("b1", BatchStatus::Failed, 0);
        assert!(r.is_significant());
        r.to_status = BatchStatus::Cancelled;
        assert!(r.is_significant());
        r.to_status = BatchStatus::Processing;
        assert!(!r.is_significant());
        r.metadata = Some(serde_json::json!({ "significant": true }));
        assert!(r.is_significant());
    }
}
