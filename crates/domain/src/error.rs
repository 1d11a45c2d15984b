//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::order::OrderError;
use crate::services::{ImageStorageError, MailerError};

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order workflow rule was violated.
    #[error("Order error: {0}")]
    Order(OrderError),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or reference constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown email or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Uploading an image failed.
    #[error("Image storage error: {0}")]
    ImageStorage(#[from] ImageStorageError),

    /// Sending an email failed.
    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    /// Returns true if the error is a stock shortage or a missing stock row.
    pub fn is_stock_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::Order(
                OrderError::InsufficientStock { .. } | OrderError::StockNotFound { .. }
            )
        )
    }
}

impl From<OrderError> for DomainError {
    fn from(e: OrderError) -> Self {
        DomainError::Order(e)
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::StockNotFound { model_id, size } => {
                OrderError::StockNotFound { model_id, size }.into()
            }
            StoreError::InsufficientStock {
                model_id,
                size,
                requested,
                available,
            } => OrderError::InsufficientStock {
                model_id,
                size,
                requested,
                available,
            }
            .into(),
            StoreError::ItemExhausted { item_id } => OrderError::ItemExhausted { item_id }.into(),
            StoreError::StateMismatch {
                id,
                expected,
                actual,
            } => OrderError::StateChanged {
                order_id: id,
                expected,
                actual,
            }
            .into(),
            StoreError::QuantityOverflow { model_id, size } => DomainError::Validation(format!(
                "stock quantity for model {model_id} size {size} would overflow"
            )),
            StoreError::Conflict(message) => DomainError::Conflict(message),
            other => DomainError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ModelId;

    use super::*;

    #[test]
    fn store_stock_errors_become_order_errors() {
        let err: DomainError = StoreError::InsufficientStock {
            model_id: ModelId::new(),
            size: 38,
            requested: 4,
            available: 1,
        }
        .into();
        assert!(err.is_stock_conflict());
        assert!(err.to_string().contains("size 38"));
    }

    #[test]
    fn store_not_found_keeps_entity() {
        let err: DomainError = StoreError::NotFound {
            entity: "Order",
            id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, DomainError::NotFound { entity: "Order", .. }));
    }
}
