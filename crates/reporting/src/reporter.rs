//! Loads report inputs from the store.

use std::time::Instant;

use store::{CatalogStore, OrderStore};

use crate::Result;
use crate::report::{ReportQuery, SalesReport, aggregate};

/// Builds sales reports from committed orders.
#[derive(Clone)]
pub struct SalesReporter<S> {
    store: S,
}

impl<S: OrderStore + CatalogStore> SalesReporter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Aggregates the orders matching the query.
    #[tracing::instrument(skip(self))]
    pub async fn report(&self, query: &ReportQuery) -> Result<SalesReport> {
        let started = Instant::now();
        let order_query = query.order_query()?;

        let sales = self.store.sales_snapshot(&order_query).await?;
        let report = aggregate(&order_query, &sales.orders, &sales.lines);

        metrics::counter!("sales_reports_total").increment(1);
        metrics::histogram!("sales_report_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(
            orders = report.order_count,
            units = report.units_sold,
            "sales report built"
        );
        Ok(report)
    }

    /// Units across every stock row.
    pub async fn stock_total(&self) -> Result<i64> {
        Ok(self.store.total_stock_quantity().await?)
    }
}
