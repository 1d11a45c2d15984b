//! Order lifecycle state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of an order in its lifecycle.
///
/// ```text
/// Created ──► Payment Sent ──► Confirmed ──► Delivered
/// ```
///
/// Orders still in `Created` after the reconciliation cutoff are cancelled
/// and their stock returned. Only `Confirmed` and `Delivered` orders count as
/// sales in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    #[default]
    Created,
    #[serde(rename = "Payment Sent")]
    PaymentSent,
    Confirmed,
    Delivered,
}

/// Returned when a string is not a known order state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown order state: {0}")]
pub struct ParseOrderStateError(pub String);

impl OrderState {
    /// All states, in lifecycle order.
    pub const ALL: [OrderState; 4] = [
        OrderState::Created,
        OrderState::PaymentSent,
        OrderState::Confirmed,
        OrderState::Delivered,
    ];

    /// Returns true if orders in this state are counted as completed sales.
    pub fn counts_as_sale(&self) -> bool {
        matches!(self, OrderState::Confirmed | OrderState::Delivered)
    }

    /// Returns true if the scheduled reconciliation may cancel orders in this state.
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, OrderState::Created)
    }

    /// Returns the state name as stored and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "Created",
            OrderState::PaymentSent => "Payment Sent",
            OrderState::Confirmed => "Confirmed",
            OrderState::Delivered => "Delivered",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderState {
    type Err = ParseOrderStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseOrderStateError(s.to_string()))
    }
}
