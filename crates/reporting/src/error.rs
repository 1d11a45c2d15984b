//! Reporting error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while building a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// The date range ends before it starts.
    #[error("Invalid range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Result type for reporting operations.
pub type Result<T> = std::result::Result<T, ReportError>;
