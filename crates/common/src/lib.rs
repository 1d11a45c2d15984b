//! Shared identifiers and value types used across every crate of the
//! wholesale ordering backend.

pub mod ids;
pub mod money;
pub mod role;
pub mod state;

pub use ids::{DirectionId, ImageId, ModelId, OrderId, OrderItemId, ProductId, StockId, UserId};
pub use money::Money;
pub use role::{ParseRoleError, Role};
pub use state::{OrderState, ParseOrderStateError};
