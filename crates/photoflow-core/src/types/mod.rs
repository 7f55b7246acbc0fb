//! Domain types shared across the PhotoFlow crates.

pub mod batch;
pub mod status;

pub use batch::{BackoffPolicy, BatchJob, FileDescriptor, JobOptions, JobState};
pub use status::BatchStatus;
