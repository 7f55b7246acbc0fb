//! Status transition tracking for PhotoFlow batches.
//!
//! This crate provides:
//! - An append-only audit trail of batch and per-file status transitions
//! - History capping, lossy compression, and time-based retention
//! - Per-batch and global statistics for dashboards
//! - JSON/CSV history export

pub mod retention;
pub mod statistics;
pub mod store;
pub mod tracker;

pub use retention::RetentionTask;
pub use statistics::{BatchStatistics, GlobalStatistics, ReasonCount, TransitionCount};
pub use store::{MemoryStatusStore, StatusRecord, StatusStore};
pub use tracker::{ExportFormat, HistoryFilter, StatusTracker};
