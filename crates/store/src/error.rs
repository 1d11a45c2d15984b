use common::{ModelId, OrderState};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No stock row exists for the (model, size) pair.
    #[error("Stock not found for model {model_id} size {size}")]
    StockNotFound { model_id: ModelId, size: i32 },

    /// The guarded decrement found fewer units than requested.
    #[error(
        "Insufficient stock for model {model_id} size {size}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        model_id: ModelId,
        size: i32,
        requested: i32,
        available: i32,
    },

    /// Adding units would overflow the stock quantity.
    #[error("Stock quantity overflow for model {model_id} size {size}")]
    QuantityOverflow { model_id: ModelId, size: i32 },

    /// The order left the state the operation requires.
    #[error("Order {id} is {actual}, expected {expected}")]
    StateMismatch {
        id: String,
        expected: OrderState,
        actual: OrderState,
    },

    /// An order item has no units left to remove.
    #[error("Order item {item_id} has no units left")]
    ItemExhausted { item_id: String },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row holds a value that does not map back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
