//! Cancels orders that stayed unpaid for too long.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, OrderState};
use domain::{DomainError, OrderError, OrderWorkflow};
use serde::Serialize;
use store::Store;
use tokio::task::JoinHandle;

use crate::Result;
use crate::schedule::DailySchedule;

/// When an order counts as stale and what happens to its owner.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    /// Age after which a `Created` order is cancelled.
    pub stale_after: Duration,
    /// Increment the owner's penalty count for every cancelled order.
    pub penalize_owner: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(24),
            penalize_owner: true,
        }
    }
}

/// An order the run could not cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
    pub order_id: OrderId,
    pub reason: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub cancelled: Vec<OrderId>,
    /// Orders that left `Created` between listing and cancelling.
    pub skipped: Vec<OrderId>,
    pub failed: Vec<ReconcileFailure>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the stale-order sweep.
#[derive(Clone)]
pub struct Reconciler<S: Store> {
    workflow: OrderWorkflow<S>,
    settings: ReconcileSettings,
}

impl<S: Store> Reconciler<S> {
    pub fn new(workflow: OrderWorkflow<S>, settings: ReconcileSettings) -> Self {
        Self { workflow, settings }
    }

    /// Cancels every `Created` order older than the cutoff.
    ///
    /// Each order is cancelled on its own; one failure is recorded and the
    /// sweep moves on. Only failing to list the stale orders fails the run.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReconciliationReport> {
        metrics::counter!("reconciliation_runs_total").increment(1);
        let started = Instant::now();
        let cutoff = now - self.settings.stale_after;

        let stale = self
            .workflow
            .store()
            .stale_orders(OrderState::Created, cutoff)
            .await?;

        let mut report = ReconciliationReport::default();
        for order_id in stale {
            match self
                .workflow
                .expire_order(order_id, self.settings.penalize_owner)
                .await
            {
                Ok(_) => {
                    metrics::counter!("reconciliation_cancelled_total").increment(1);
                    report.cancelled.push(order_id);
                }
                Err(DomainError::Order(OrderError::StateChanged { actual, .. })) => {
                    metrics::counter!("reconciliation_skipped_total").increment(1);
                    tracing::info!(%order_id, state = %actual, "order moved on, not cancelled");
                    report.skipped.push(order_id);
                }
                Err(e) => {
                    metrics::counter!("reconciliation_failures_total").increment(1);
                    tracing::warn!(%order_id, error = %e, "failed to cancel stale order");
                    report.failed.push(ReconcileFailure {
                        order_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        metrics::histogram!("reconciliation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            %cutoff,
            cancelled = report.cancelled.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "reconciliation complete"
        );
        Ok(report)
    }
}

/// Runs the reconciler once a day at the scheduled time, forever.
pub fn spawn<S>(reconciler: Reconciler<S>, schedule: DailySchedule) -> JoinHandle<()>
where
    S: Store + Clone + 'static,
{
    tokio::spawn(async move {
        loop {
            let delay = schedule.delay_from(Utc::now());
            tracing::debug!(?delay, %schedule, "next reconciliation scheduled");
            tokio::time::sleep(delay).await;

            if let Err(e) = reconciler.run_once(Utc::now()).await {
                tracing::error!(error = %e, "reconciliation run failed");
            }
        }
    })
}
