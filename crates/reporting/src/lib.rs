//! Sales reporting for the wholesale ordering backend.
//!
//! Reports are pure read-side aggregation over committed orders:
//! - [`SalesReporter`] loads orders and priced lines from the store
//! - [`aggregate`] folds them into a [`SalesReport`]
//! - [`line_price`] resolves the unit price each sold item counts at

pub mod error;
pub mod report;
pub mod reporter;

pub use error::{ReportError, Result};
pub use report::{BestSeller, ModelSales, ReportQuery, SalesReport, aggregate, line_price};
pub use reporter::SalesReporter;
