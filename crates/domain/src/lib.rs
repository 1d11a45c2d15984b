//! Domain layer for the wholesale ordering backend.
//!
//! This crate holds the business rules on top of the [`store`] traits:
//! - [`OrderWorkflow`]: order placement with size curves and role pricing,
//!   reversal, item-level mutation and payment events
//! - [`CatalogService`]: validated catalog administration and image upload
//! - [`UserService`]: registration, sign-in and shipping addresses
//! - [`services`]: the injected email and image storage collaborators

pub mod catalog;
pub mod error;
pub mod order;
pub mod payment;
pub mod services;
pub mod users;

pub use catalog::{CatalogService, MAX_STOCK_ADJUSTMENT};
pub use error::DomainError;
pub use order::{
    CurveLine, CurveSpec, NormalLine, OrderError, OrderLines, OrderWorkflow, PlaceOrder,
    Requirement, price_requirements, priced_total,
};
pub use payment::{PaymentEvent, PaymentStatus, sign_payload, verify_signature};
pub use users::{
    DEFAULT_DIRECTION_NAME, DirectionInput, MIN_PASSWORD_LEN, Signup, UserService, hash_password,
    normalize_email, verify_password,
};
