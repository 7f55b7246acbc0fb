//! # photoflow-core
//!
//! Core crate for PhotoFlow. Contains configuration schemas, batch/file
//! domain types, the clock abstraction, and the unified error system.
//!
//! This crate has **no** internal dependencies on other PhotoFlow crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::AppError;
pub use result::AppResult;
