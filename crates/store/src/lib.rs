//! Persistence layer for the wholesale ordering backend.
//!
//! Store traits ([`CatalogStore`], [`UserStore`], [`OrderStore`]) are
//! implemented twice: [`InMemoryStore`] for tests and local runs, and
//! [`PostgresStore`] for production. Every multi-row workflow operation
//! (order placement, cancellation, item removal) is atomic in both.

pub mod entities;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use entities::*;
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{OrderQuery, SalesLine, SalesSnapshot};
pub use store::{
    Cancellation, CatalogStore, ItemRemoval, NewOrder, NewOrderItem, OrderStore, StockDemand, Store, UserStore,
    items_subtotal, order_total, stock_demands,
};
