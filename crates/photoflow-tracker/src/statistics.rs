//! Statistics computed from status histories.
//!
//! All computations assume per-batch insertion order is chronological;
//! callers must not record transitions out of timestamp order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use photoflow_core::types::BatchStatus;

use crate::store::StatusRecord;

/// Minimum processing-to-failed gap treated as a timeout, in milliseconds.
const TIMEOUT_INFERENCE_GAP_MS: i64 = 30 * 60 * 1_000;

/// Time-in-status breakdown for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStatistics {
    /// Milliseconds spent in each observed status.
    pub time_spent_in_status: HashMap<BatchStatus, i64>,
    /// First-to-last record span in milliseconds.
    pub total_duration_ms: i64,
    /// Mean inter-transition time in milliseconds.
    pub average_transition_ms: i64,
    /// Number of recorded transitions.
    pub transition_count: usize,
}

/// One `from -> to` edge with its observation count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCount {
    /// Source status; `None` for initial records.
    pub from_status: Option<BatchStatus>,
    /// Destination status.
    pub to_status: BatchStatus,
    /// Times this edge was observed.
    pub count: usize,
}

/// One failure reason with its tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    /// Reason string (from metadata, or the inferred `processing_timeout`).
    pub reason: String,
    /// Times this reason was observed.
    pub count: usize,
}

/// Failure-pattern analytics across every tracked batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStatistics {
    /// Number of batches with at least one record.
    pub total_batches: usize,
    /// Batches whose last record is `failed`, over total batches.
    pub failure_rate: f64,
    /// Mean observed milliseconds per status across all batches.
    pub average_time_in_status: HashMap<BatchStatus, i64>,
    /// The five most frequent transitions, ties kept in first-encountered
    /// order.
    pub common_transitions: Vec<TransitionCount>,
    /// Up to five most common failure reasons.
    pub common_failure_reasons: Vec<ReasonCount>,
}

/// Walk consecutive record pairs: the time in `records[i].to_status` is
/// the gap until `records[i+1]`.
pub fn batch_statistics(records: &[StatusRecord]) -> BatchStatistics {
    if records.is_empty() {
        return BatchStatistics::default();
    }

    let mut time_spent_in_status: HashMap<BatchStatus, i64> = HashMap::new();
    for pair in records.windows(2) {
        let gap = (pair[1].timestamp - pair[0].timestamp).num_milliseconds();
        *time_spent_in_status.entry(pair[0].to_status).or_insert(0) += gap;
    }

    let total_duration_ms = (records[records.len() - 1].timestamp - records[0].timestamp)
        .num_milliseconds();
    let transition_count = records.len();
    let average_transition_ms = if records.len() > 1 {
        total_duration_ms / (records.len() as i64 - 1)
    } else {
        0
    };

    BatchStatistics {
        time_spent_in_status,
        total_duration_ms,
        average_transition_ms,
        transition_count,
    }
}

/// Aggregate statistics across all tracked batches.
pub fn global_statistics(histories: &[(String, Vec<StatusRecord>)]) -> GlobalStatistics {
    let tracked: Vec<&(String, Vec<StatusRecord>)> =
        histories.iter().filter(|(_, h)| !h.is_empty()).collect();
    if tracked.is_empty() {
        return GlobalStatistics::default();
    }

    let total_batches = tracked.len();
    let failed_batches = tracked
        .iter()
        .filter(|(_, h)| h.last().map(|r| r.to_status) == Some(BatchStatus::Failed))
        .count();

    // Durations per status pooled across batches, then averaged.
    let mut duration_sums: HashMap<BatchStatus, (i64, i64)> = HashMap::new();
    for (_, history) in &tracked {
        for pair in history.windows(2) {
            let gap = (pair[1].timestamp - pair[0].timestamp).num_milliseconds();
            let entry = duration_sums.entry(pair[0].to_status).or_insert((0, 0));
            entry.0 += gap;
            entry.1 += 1;
        }
    }
    let average_time_in_status = duration_sums
        .into_iter()
        .map(|(status, (sum, count))| (status, sum / count.max(1)))
        .collect();

    // Transition tallies in encounter order so the post-sort tie order is
    // deterministic.
    let mut transitions: Vec<TransitionCount> = Vec::new();
    for (_, history) in &tracked {
        for record in history.iter() {
            match transitions.iter_mut().find(|t| {
                t.from_status == record.from_status && t.to_status == record.to_status
            }) {
                Some(existing) => existing.count += 1,
                None => transitions.push(TransitionCount {
                    from_status: record.from_status,
                    to_status: record.to_status,
                    count: 1,
                }),
            }
        }
    }
    transitions.sort_by(|a, b| b.count.cmp(&a.count));
    transitions.truncate(5);

    let mut reasons: Vec<ReasonCount> = Vec::new();
    let mut tally = |reason: String| match reasons.iter_mut().find(|r| r.reason == reason) {
        Some(existing) => existing.count += 1,
        None => reasons.push(ReasonCount { reason, count: 1 }),
    };

    for (_, history) in &tracked {
        for record in history.iter() {
            if record.to_status != BatchStatus::Failed {
                continue;
            }
            if let Some(reason) = record
                .metadata
                .as_ref()
                .and_then(|m| m.get("reason"))
                .and_then(|v| v.as_str())
            {
                tally(reason.to_string());
            }
        }

        // A long processing-to-failed gap implies a timeout even when no
        // explicit reason was recorded.
        let processing_at = history
            .iter()
            .find(|r| r.to_status == BatchStatus::Processing)
            .map(|r| r.timestamp);
        let failed_at = history
            .iter()
            .find(|r| r.to_status == BatchStatus::Failed)
            .map(|r| r.timestamp);
        if let (Some(started), Some(failed)) = (processing_at, failed_at) {
            if (failed - started).num_milliseconds() >= TIMEOUT_INFERENCE_GAP_MS {
                tally("processing_timeout".to_string());
            }
        }
    }
    reasons.sort_by(|a, b| b.count.cmp(&a.count));
    reasons.truncate(5);

    GlobalStatistics {
        total_batches,
        failure_rate: failed_batches as f64 / total_batches as f64,
        average_time_in_status,
        common_transitions: transitions,
        common_failure_reasons: reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(
        batch_id: &str,
        from: Option<BatchStatus>,
        to: BatchStatus,
        millis: i64,
        metadata: Option<serde_json::Value>,
    ) -> StatusRecord {
        StatusRecord {
            batch_id: batch_id.to_string(),
            from_status: from,
            to_status: to,
            timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
            metadata,
        }
    }

    fn happy_path(batch_id: &str, base: i64) -> Vec<StatusRecord> {
        vec![
            record(batch_id, None, BatchStatus::Queued, base, None),
            record(
                batch_id,
                Some(BatchStatus::Queued),
                BatchStatus::Processing,
                base + 1_000,
                None,
            ),
            record(
                batch_id,
                Some(BatchStatus::Processing),
                BatchStatus::Completed,
                base + 4_000,
                None,
            ),
        ]
    }

    #[test]
    fn time_in_status_sums_to_total() {
        let stats = batch_statistics(&happy_path("b1", 0));
        assert_eq!(stats.time_spent_in_status[&BatchStatus::Queued], 1_000);
        assert_eq!(stats.time_spent_in_status[&BatchStatus::Processing], 3_000);
        assert_eq!(stats.total_duration_ms, 4_000);
        assert_eq!(
            stats.time_spent_in_status.values().sum::<i64>(),
            stats.total_duration_ms
        );
        assert_eq!(stats.average_transition_ms, 2_000);
        assert_eq!(stats.transition_count, 3);
    }

    #[test]
    fn empty_history_is_zero_filled() {
        let stats = batch_statistics(&[]);
        assert!(stats.time_spent_in_status.is_empty());
        assert_eq!(stats.total_duration_ms, 0);
        assert_eq!(stats.average_transition_ms, 0);
        assert_eq!(stats.transition_count, 0);
    }

    #[test]
    fn failure_rate_counts_failed_terminal_batches() {
        let failed = vec![
            record("b2", None, BatchStatus::Queued, 0, None),
            record(
                "b2",
                Some(BatchStatus::Queued),
                BatchStatus::Failed,
                1_000,
                Some(json!({ "reason": "disk full" })),
            ),
        ];
        let histories = vec![
            ("b1".to_string(), happy_path("b1", 0)),
            ("b2".to_string(), failed),
        ];
        let stats = global_statistics(&histories);
        assert_eq!(stats.total_batches, 2);
        assert!((stats.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.common_failure_reasons[0].reason, "disk full");
    }

    #[test]
    fn common_transitions_are_top_five_in_encounter_order() {
        let mut histories = Vec::new();
        for i in 0..3 {
            histories.push((format!("b{i}"), happy_path(&format!("b{i}"), 0)));
        }
        let stats = global_statistics(&histories);
        assert!(stats.common_transitions.len() <= 5);
        assert_eq!(stats.common_transitions[0].count, 3);
        // All three edges tie at 3; encounter order breaks the tie.
        assert_eq!(stats.common_transitions[0].from_status, None);
        assert_eq!(stats.common_transitions[0].to_status, BatchStatus::Queued);
    }

    #[test]
    fn long_processing_gap_infers_a_timeout() {
        let history = vec![
            record("b1", None, BatchStatus::Queued, 0, None),
            record(
                "b1",
                Some(BatchStatus::Queued),
                BatchStatus::Processing,
                1_000,
                None,
            ),
            record(
                "b1",
                Some(BatchStatus::Processing),
                BatchStatus::Failed,
                1_000 + 30 * 60 * 1_000,
                None,
            ),
        ];
        let stats = global_statistics(&[("b1".to_string(), history)]);
        assert_eq!(stats.common_failure_reasons[0].reason, "processing_timeout");
    }

    #[test]
    fn short_processing_gap_infers_nothing() {
        let history = vec![
            record("b1", None, BatchStatus::Processing, 0, None),
            record(
                "b1",
                Some(BatchStatus::Processing),
                BatchStatus::Failed,
                60_000,
                None,
            ),
        ];
        let stats = global_statistics(&[("b1".to_string(), history)]);
        assert!(stats.common_failure_reasons.is_empty());
    }
}
