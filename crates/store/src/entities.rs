//! Rows of the relational schema and the inputs used to create or patch them.

use chrono::{DateTime, Utc};
use common::{
    DirectionId, ImageId, ModelId, Money, OrderId, OrderItemId, OrderState, ProductId, Role,
    StockId, UserId,
};
use serde::{Deserialize, Serialize};

// -- Users --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    /// Stale orders of this user cancelled by reconciliation.
    pub penalties: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    /// Must already be case-folded.
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

// -- Directions --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Direction {
    pub id: DirectionId,
    pub user_id: UserId,
    pub name: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDirection {
    pub user_id: UserId,
    pub name: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectionPatch {
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

// -- Catalog --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A product with its models, as listed in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithModels {
    #[serde(flatten)]
    pub product: Product,
    pub models: Vec<Model>,
}

/// A product with every model's stock and images.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub models: Vec<ModelDetail>,
}

/// The price columns of a model, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceTiers {
    /// What the model costs the business.
    pub cost: Money,
    pub retail: Money,
    pub reseller: Money,
    pub allied: Money,
    pub promotional: Money,
}

impl PriceTiers {
    /// Returns the column a customer of `role` buys at, ignoring promotions.
    pub fn for_role(&self, role: Option<Role>) -> Money {
        match role {
            Some(Role::Reseller) => self.reseller,
            Some(Role::AlliedStore) => self.allied,
            Some(Role::Retail) | Some(Role::Admin) | None => self.retail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub id: ModelId,
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    pub description: Option<String>,
    pub prices: PriceTiers,
    pub on_promotion: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// The unit price a customer of `role` pays today.
    pub fn unit_price_for(&self, role: Option<Role>) -> Money {
        if self.on_promotion {
            self.prices.promotional
        } else {
            self.prices.for_role(role)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewModel {
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    pub description: Option<String>,
    pub prices: PriceTiers,
    pub on_promotion: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub prices: Option<PriceTiers>,
    pub on_promotion: Option<bool>,
}

/// A model with its stock rows and the sum of their quantities.
#[derive(Debug, Clone, Serialize)]
pub struct ModelWithStock {
    #[serde(flatten)]
    pub model: Model,
    pub stocks: Vec<Stock>,
    pub total_stock: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDetail {
    #[serde(flatten)]
    pub model: Model,
    pub stocks: Vec<Stock>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stock {
    pub id: StockId,
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStock {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: ImageId,
    pub model_id: ModelId,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Orders --

/// Whether an order was placed size by size or as size-curve bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[default]
    Normal,
    Curve,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Normal => "normal",
            OrderKind::Curve => "curve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(OrderKind::Normal),
            "curve" => Some(OrderKind::Curve),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub total: Money,
    pub discount: Money,
    pub state: OrderState,
    pub comments: Option<String>,
    pub kind: OrderKind,
    pub payment_link: Option<String>,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
    /// Price per unit captured when the order was placed.
    pub unit_price: Option<Money>,
}

/// An order together with its items and owner.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub user: Option<User>,
}

impl OrderDetail {
    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Total units across every item.
    pub fn units(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub state: Option<OrderState>,
    pub comments: Option<String>,
    pub payment_link: Option<String>,
    pub paid: Option<bool>,
}
