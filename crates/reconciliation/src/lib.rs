//! Scheduled reconciliation of stale orders.
//!
//! Orders still in `Created` after a configurable age are cancelled through
//! the same guarded reversal the order workflow uses, so their units return
//! to stock:
//! 1. [`Reconciler::run_once`] lists and cancels stale orders independently
//! 2. [`DailySchedule`] computes the next run time
//! 3. [`spawn`] runs the job forever on a tokio task

pub mod error;
pub mod reconciler;
pub mod schedule;

pub use error::{ReconcileError, Result};
pub use reconciler::{ReconcileFailure, ReconcileSettings, ReconciliationReport, Reconciler, spawn};
pub use schedule::DailySchedule;
