//! Batch status enumeration.
//!
//! The status set is closed; the tracker validates membership at record
//! time but deliberately does not enforce a transition graph (any status
//! may follow any other).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Status of a photo batch (or of an individual file within a batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Accepted and waiting for a worker slot.
    Queued,
    /// Currently being processed.
    Processing,
    /// All files processed successfully.
    Completed,
    /// Processing failed after all retry attempts.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Retained for audit only; no longer served.
    Archived,
}

impl BatchStatus {
    /// All members of the closed status set.
    pub const ALL: [BatchStatus; 6] = [
        Self::Queued,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Archived,
    ];

    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::validation(format!(
                "Invalid status transition: '{other}' is not a known status"
            ))),
        }
    }
}
