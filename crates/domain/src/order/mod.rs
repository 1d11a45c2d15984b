//! Order placement, reversal and administration.

mod curve;
mod pricing;
mod request;
mod workflow;

pub use curve::CurveSpec;
pub use pricing::{price_requirements, priced_total};
pub use request::{CurveLine, NormalLine, OrderLines, PlaceOrder, Requirement};
pub use workflow::OrderWorkflow;

use common::{ModelId, Money, OrderState};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request has no lines.
    #[error("Order has no items")]
    NoItems,

    /// A line asks for zero or fewer units or bundles.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i32 },

    /// A size-curve specification could not be parsed.
    #[error("Invalid curve '{spec}': {reason}")]
    InvalidCurve { spec: String, reason: String },

    /// A requested model does not exist.
    #[error("Model not found: {model_id}")]
    ModelNotFound { model_id: ModelId },

    /// No stock row exists for the requested model and size.
    #[error("Stock not found for model {model_id} size {size}")]
    StockNotFound { model_id: ModelId, size: i32 },

    /// Not enough units for the requested model and size.
    #[error(
        "Insufficient stock for model {model_id} size {size}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        model_id: ModelId,
        size: i32,
        requested: i32,
        available: i32,
    },

    /// The item has no units left to remove.
    #[error("Order item {item_id} has no units left")]
    ItemExhausted { item_id: String },

    /// The discount is negative or larger than the items subtotal.
    #[error("Invalid discount {discount}: must be between $0.00 and {subtotal}")]
    InvalidDiscount { discount: Money, subtotal: Money },

    /// The order moved on to another state before the operation could lock it.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StateChanged {
        order_id: String,
        expected: OrderState,
        actual: OrderState,
    },

    /// No order carries the payment reference.
    #[error("No order carries payment reference {reference}")]
    UnknownPaymentReference { reference: String },
}
