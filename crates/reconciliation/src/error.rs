//! Reconciliation error types.

use thiserror::Error;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Listing stale orders failed.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// A schedule string could not be parsed.
    #[error("Invalid schedule '{0}': expected HH:MM")]
    InvalidSchedule(String),
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconcileError>;
