use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    DirectionId, ImageId, ModelId, Money, OrderId, OrderItemId, OrderState, ProductId, StockId,
    UserId,
};

use crate::entities::*;
use crate::{OrderQuery, Result, SalesSnapshot};

/// Catalog persistence: products, models, stock rows and images.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, new: NewProduct) -> Result<Product>;

    /// Lists products newest first, each with its models.
    async fn list_products(&self) -> Result<Vec<ProductWithModels>>;

    /// Loads a product with every model's stock rows and images.
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductDetail>>;

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product>;

    async fn delete_product(&self, id: ProductId) -> Result<()>;

    async fn insert_model(&self, new: NewModel) -> Result<Model>;

    /// Lists models newest first, each with its stock rows and total stock.
    async fn list_models(&self) -> Result<Vec<ModelWithStock>>;

    async fn get_model(&self, id: ModelId) -> Result<Option<Model>>;

    async fn update_model(&self, id: ModelId, patch: ModelPatch) -> Result<Model>;

    async fn delete_model(&self, id: ModelId) -> Result<()>;

    /// Inserts a stock row. Fails with `Conflict` if the (model, size) pair exists.
    async fn insert_stock(&self, new: NewStock) -> Result<Stock>;

    async fn list_stocks(&self) -> Result<Vec<Stock>>;

    async fn get_stock(&self, id: StockId) -> Result<Option<Stock>>;

    async fn find_stock(&self, model_id: ModelId, size: i32) -> Result<Option<Stock>>;

    /// Adds a signed delta to a stock row's quantity.
    ///
    /// Fails with `InsufficientStock` if the result would be negative.
    async fn restock(&self, id: StockId, delta: i32) -> Result<Stock>;

    async fn delete_stock(&self, id: StockId) -> Result<()>;

    /// Sum of every stock row's quantity.
    async fn total_stock_quantity(&self) -> Result<i64>;

    /// Inserts one image row per URL.
    async fn insert_images(&self, model_id: ModelId, urls: Vec<String>) -> Result<Vec<Image>>;

    async fn list_images(&self) -> Result<Vec<Image>>;

    async fn get_image(&self, id: ImageId) -> Result<Option<Image>>;

    async fn update_image(&self, id: ImageId, url: String) -> Result<Image>;

    async fn delete_image(&self, id: ImageId) -> Result<()>;
}

/// Users and their saved shipping addresses.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `Conflict` if the email is taken.
    async fn insert_user(&self, new: NewUser) -> Result<User>;

    /// Looks a user up by case-folded email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Lists every non-admin user, newest first.
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User>;

    async fn insert_direction(&self, new: NewDirection) -> Result<Direction>;

    /// Lists directions newest first, optionally only those of one user.
    async fn list_directions(&self, owner: Option<UserId>) -> Result<Vec<Direction>>;

    async fn get_direction(&self, id: DirectionId) -> Result<Option<Direction>>;

    async fn update_direction(&self, id: DirectionId, patch: DirectionPatch) -> Result<Direction>;

    async fn delete_direction(&self, id: DirectionId) -> Result<()>;
}

/// How much of an order item to give back to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRemoval {
    /// Delete the item and restore its full quantity.
    Whole,
    /// Restore one unit; the item is deleted when its last unit goes.
    OneUnit,
}

/// How an order is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cancellation {
    /// Increment the owner's penalty count in the same transaction.
    pub penalize_owner: bool,
    /// Cancel only if the order is still in this state when it is locked.
    pub only_in: Option<OrderState>,
}

impl Cancellation {
    /// A cancellation requested by the owner or an admin: any state, no penalty.
    pub fn requested() -> Self {
        Self::default()
    }

    /// Expiry of an unpaid order: it must still be `Created`.
    pub fn expiry(penalize_owner: bool) -> Self {
        Self {
            penalize_owner,
            only_in: Some(OrderState::Created),
        }
    }
}

/// A priced line of an order about to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
    pub unit_price: Money,
}

/// An order about to be placed.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub kind: OrderKind,
    pub comments: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Units required from one stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDemand {
    pub model_id: ModelId,
    pub size: i32,
    pub quantity: i32,
}

/// Order persistence, including the atomic stock-moving operations.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and its items and decrements stock, atomically.
    ///
    /// Each decrement is guarded on the quantity at commit time. A failed
    /// guard aborts the whole operation with `StockNotFound` or
    /// `InsufficientStock`; nothing is written.
    async fn place_order(&self, new: NewOrder) -> Result<OrderDetail>;

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDetail>>;

    /// Lists orders newest first, optionally only those of one user.
    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>>;

    /// Deletes the order and its items and returns every unit to stock,
    /// atomically. A missing stock row aborts with `StockNotFound`.
    ///
    /// The state is checked against `cancel.only_in` after the order is
    /// locked; a mismatch aborts with `StateMismatch` and nothing changes.
    async fn cancel_order(&self, id: OrderId, cancel: Cancellation) -> Result<OrderDetail>;

    /// Removes units of one item, returns them to stock and recomputes the
    /// order total, atomically.
    async fn remove_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        removal: ItemRemoval,
    ) -> Result<OrderDetail>;

    /// Stores a discount and recomputes the order total.
    async fn apply_discount(&self, id: OrderId, discount: Money) -> Result<OrderDetail>;

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<OrderDetail>;

    async fn find_order_by_payment_link(&self, reference: &str) -> Result<Option<Order>>;

    /// Ids of orders in `state` created before `created_before`, oldest first.
    async fn stale_orders(
        &self,
        state: OrderState,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<OrderId>>;

    /// Orders matching the query and their items joined with model pricing,
    /// both read from the same snapshot.
    async fn sales_snapshot(&self, query: &OrderQuery) -> Result<SalesSnapshot>;
}

/// Everything the application needs from persistence.
pub trait Store: CatalogStore + UserStore + OrderStore {}

impl<T: CatalogStore + UserStore + OrderStore + ?Sized> Store for T {}

/// Aggregates items into one demand per (model, size).
///
/// Demands come back ordered by (model, size) so concurrent transactions
/// touch stock rows in the same order.
pub fn stock_demands(lines: impl IntoIterator<Item = (ModelId, i32, i32)>) -> Vec<StockDemand> {
    let mut merged: BTreeMap<(ModelId, i32), i32> = BTreeMap::new();
    for (model_id, size, quantity) in lines {
        *merged.entry((model_id, size)).or_default() += quantity;
    }
    merged
        .into_iter()
        .map(|((model_id, size), quantity)| StockDemand {
            model_id,
            size,
            quantity,
        })
        .collect()
}

/// Sum of captured price × quantity over the items.
pub fn items_subtotal(items: &[OrderItem]) -> Money {
    items
        .iter()
        .map(|item| {
            item.unit_price
                .unwrap_or_default()
                .multiply(item.quantity.max(0).unsigned_abs())
        })
        .sum()
}

/// The authoritative order total: item subtotal minus discount, never negative.
pub fn order_total(items: &[OrderItem], discount: Money) -> Money {
    (items_subtotal(items) - discount).non_negative()
}
