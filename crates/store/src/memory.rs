use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    DirectionId, ImageId, ModelId, Money, OrderId, OrderItemId, OrderState, ProductId, StockId,
    UserId,
};
use tokio::sync::RwLock;

use crate::entities::*;
use crate::store::{
    Cancellation, CatalogStore, ItemRemoval, NewOrder, OrderStore, UserStore, order_total,
    stock_demands,
};
use crate::{OrderQuery, Result, SalesLine, SalesSnapshot, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    directions: HashMap<DirectionId, Direction>,
    products: HashMap<ProductId, Product>,
    models: HashMap<ModelId, Model>,
    stocks: HashMap<StockId, Stock>,
    images: HashMap<ImageId, Image>,
    orders: HashMap<OrderId, Order>,
    /// Kept in insertion order so items read back the way they were placed.
    order_items: Vec<OrderItem>,
}

/// Adds `delta` units to a stock row, refusing to go negative or overflow.
fn shift_quantity(stock: &mut Stock, delta: i32, now: DateTime<Utc>) -> Result<()> {
    let quantity = stock
        .quantity
        .checked_add(delta)
        .ok_or(StoreError::QuantityOverflow {
            model_id: stock.model_id,
            size: stock.size,
        })?;
    if quantity < 0 {
        return Err(StoreError::InsufficientStock {
            model_id: stock.model_id,
            size: stock.size,
            requested: delta.saturating_neg(),
            available: stock.quantity,
        });
    }
    stock.quantity = quantity;
    stock.updated_at = now;
    Ok(())
}

impl Tables {
    fn stock_for(&self, model_id: ModelId, size: i32) -> Option<&Stock> {
        self.stocks
            .values()
            .find(|s| s.model_id == model_id && s.size == size)
    }

    fn stock_for_mut(&mut self, model_id: ModelId, size: i32) -> Option<&mut Stock> {
        self.stocks
            .values_mut()
            .find(|s| s.model_id == model_id && s.size == size)
    }

    fn items_of(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    fn order_detail(&self, id: OrderId) -> Option<OrderDetail> {
        let order = self.orders.get(&id)?.clone();
        let user = order.user_id.and_then(|uid| self.users.get(&uid).cloned());
        Some(OrderDetail {
            items: self.items_of(id),
            order,
            user,
        })
    }

    fn order_detail_or_missing(&self, id: OrderId) -> Result<OrderDetail> {
        self.order_detail(id)
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    fn recompute_total(&mut self, id: OrderId, now: DateTime<Utc>) {
        let items = self.items_of(id);
        if let Some(order) = self.orders.get_mut(&id) {
            order.total = order_total(&items, order.discount);
            order.updated_at = now;
        }
    }

    fn model_detail(&self, model: &Model) -> ModelDetail {
        let mut stocks: Vec<Stock> = self
            .stocks
            .values()
            .filter(|s| s.model_id == model.id)
            .cloned()
            .collect();
        stocks.sort_by_key(|s| s.size);
        let mut images: Vec<Image> = self
            .images
            .values()
            .filter(|i| i.model_id == model.id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.created_at);
        ModelDetail {
            model: model.clone(),
            stocks,
            images,
        }
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows
}

fn set_if_some<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// In-memory store implementation for testing and local runs.
///
/// All tables sit behind one lock, so each operation is a single critical
/// section and multi-row operations are atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of order items stored, across every order.
    pub async fn order_item_count(&self) -> usize {
        self.tables.read().await.order_items.len()
    }

    /// Overrides an order's creation time.
    pub async fn backdate_order(&self, id: OrderId, created_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        order.created_at = created_at;
        Ok(())
    }

    /// Clears every table.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn list_products(&self) -> Result<Vec<ProductWithModels>> {
        let tables = self.tables.read().await;
        let products = tables
            .products
            .values()
            .map(|product| {
                let models = newest_first(
                    tables
                        .models
                        .values()
                        .filter(|m| m.product_id == product.id)
                        .cloned()
                        .collect(),
                    |m| m.created_at,
                );
                ProductWithModels {
                    product: product.clone(),
                    models,
                }
            })
            .collect();
        Ok(newest_first(products, |p| p.product.created_at))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductDetail>> {
        let tables = self.tables.read().await;
        let Some(product) = tables.products.get(&id) else {
            return Ok(None);
        };
        let models = newest_first(
            tables
                .models
                .values()
                .filter(|m| m.product_id == id)
                .map(|m| tables.model_detail(m))
                .collect(),
            |m| m.model.created_at,
        );
        Ok(Some(ProductDetail {
            product: product.clone(),
            models,
        }))
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        set_if_some(&mut product.name, patch.name);
        if patch.description.is_some() {
            product.description = patch.description;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&id) {
            return Err(StoreError::not_found("Product", id));
        }
        if tables.models.values().any(|m| m.product_id == id) {
            return Err(StoreError::Conflict(format!(
                "product {id} still has models"
            )));
        }
        tables.products.remove(&id);
        Ok(())
    }

    async fn insert_model(&self, new: NewModel) -> Result<Model> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&new.product_id) {
            return Err(StoreError::not_found("Product", new.product_id));
        }
        let now = Utc::now();
        let model = Model {
            id: ModelId::new(),
            product_id: new.product_id,
            name: new.name,
            color: new.color,
            description: new.description,
            prices: new.prices,
            on_promotion: new.on_promotion,
            created_at: now,
            updated_at: now,
        };
        tables.models.insert(model.id, model.clone());
        Ok(model)
    }

    async fn list_models(&self) -> Result<Vec<ModelWithStock>> {
        let tables = self.tables.read().await;
        let models = tables
            .models
            .values()
            .map(|model| {
                let detail = tables.model_detail(model);
                let total_stock = detail.stocks.iter().map(|s| i64::from(s.quantity)).sum();
                ModelWithStock {
                    model: detail.model,
                    stocks: detail.stocks,
                    total_stock,
                }
            })
            .collect();
        Ok(newest_first(models, |m| m.model.created_at))
    }

    async fn get_model(&self, id: ModelId) -> Result<Option<Model>> {
        Ok(self.tables.read().await.models.get(&id).cloned())
    }

    async fn update_model(&self, id: ModelId, patch: ModelPatch) -> Result<Model> {
        let mut tables = self.tables.write().await;
        let model = tables
            .models
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Model", id))?;
        set_if_some(&mut model.name, patch.name);
        set_if_some(&mut model.color, patch.color);
        if patch.description.is_some() {
            model.description = patch.description;
        }
        set_if_some(&mut model.prices, patch.prices);
        set_if_some(&mut model.on_promotion, patch.on_promotion);
        model.updated_at = Utc::now();
        Ok(model.clone())
    }

    async fn delete_model(&self, id: ModelId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.models.contains_key(&id) {
            return Err(StoreError::not_found("Model", id));
        }
        if tables.order_items.iter().any(|item| item.model_id == id) {
            return Err(StoreError::Conflict(format!(
                "model {id} is referenced by orders"
            )));
        }
        tables.models.remove(&id);
        tables.stocks.retain(|_, s| s.model_id != id);
        tables.images.retain(|_, i| i.model_id != id);
        Ok(())
    }

    async fn insert_stock(&self, new: NewStock) -> Result<Stock> {
        let mut tables = self.tables.write().await;
        if !tables.models.contains_key(&new.model_id) {
            return Err(StoreError::not_found("Model", new.model_id));
        }
        if tables.stock_for(new.model_id, new.size).is_some() {
            return Err(StoreError::Conflict(format!(
                "stock for model {} size {} already exists",
                new.model_id, new.size
            )));
        }
        let now = Utc::now();
        let stock = Stock {
            id: StockId::new(),
            model_id: new.model_id,
            size: new.size,
            quantity: new.quantity,
            created_at: now,
            updated_at: now,
        };
        tables.stocks.insert(stock.id, stock.clone());
        Ok(stock)
    }

    async fn list_stocks(&self) -> Result<Vec<Stock>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.stocks.values().cloned().collect(),
            |s| s.created_at,
        ))
    }

    async fn get_stock(&self, id: StockId) -> Result<Option<Stock>> {
        Ok(self.tables.read().await.stocks.get(&id).cloned())
    }

    async fn find_stock(&self, model_id: ModelId, size: i32) -> Result<Option<Stock>> {
        Ok(self.tables.read().await.stock_for(model_id, size).cloned())
    }

    async fn restock(&self, id: StockId, delta: i32) -> Result<Stock> {
        let mut tables = self.tables.write().await;
        let stock = tables
            .stocks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Stock", id))?;
        shift_quantity(stock, delta, Utc::now())?;
        Ok(stock.clone())
    }

    async fn delete_stock(&self, id: StockId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stock = tables
            .stocks
            .get(&id)
            .ok_or_else(|| StoreError::not_found("Stock", id))?;
        let (model_id, size) = (stock.model_id, stock.size);
        if tables
            .order_items
            .iter()
            .any(|item| item.model_id == model_id && item.size == size)
        {
            return Err(StoreError::Conflict(format!(
                "stock for model {model_id} size {size} is referenced by orders"
            )));
        }
        tables.stocks.remove(&id);
        Ok(())
    }

    async fn total_stock_quantity(&self) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables.stocks.values().map(|s| i64::from(s.quantity)).sum())
    }

    async fn insert_images(&self, model_id: ModelId, urls: Vec<String>) -> Result<Vec<Image>> {
        let mut tables = self.tables.write().await;
        if !tables.models.contains_key(&model_id) {
            return Err(StoreError::not_found("Model", model_id));
        }
        let now = Utc::now();
        let images: Vec<Image> = urls
            .into_iter()
            .map(|url| Image {
                id: ImageId::new(),
                model_id,
                url,
                created_at: now,
                updated_at: now,
            })
            .collect();
        for image in &images {
            tables.images.insert(image.id, image.clone());
        }
        Ok(images)
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.images.values().cloned().collect(),
            |i| i.created_at,
        ))
    }

    async fn get_image(&self, id: ImageId) -> Result<Option<Image>> {
        Ok(self.tables.read().await.images.get(&id).cloned())
    }

    async fn update_image(&self, id: ImageId, url: String) -> Result<Image> {
        let mut tables = self.tables.write().await;
        let image = tables
            .images
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Image", id))?;
        image.url = url;
        image.updated_at = Utc::now();
        Ok(image.clone())
    }

    async fn delete_image(&self, id: ImageId) -> Result<()> {
        self.tables
            .write()
            .await
            .images
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("Image", id))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                new.email
            )));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            phone: new.phone,
            role: new.role,
            penalties: 0,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .users
                .values()
                .filter(|u| !u.role.is_admin())
                .cloned()
                .collect(),
            |u| u.created_at,
        ))
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("User", id))?;
        set_if_some(&mut user.name, patch.name);
        if patch.phone.is_some() {
            user.phone = patch.phone;
        }
        set_if_some(&mut user.role, patch.role);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn insert_direction(&self, new: NewDirection) -> Result<Direction> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&new.user_id) {
            return Err(StoreError::not_found("User", new.user_id));
        }
        let now = Utc::now();
        let direction = Direction {
            id: DirectionId::new(),
            user_id: new.user_id,
            name: new.name,
            street: new.street,
            city: new.city,
            province: new.province,
            postal_code: new.postal_code,
            phone: new.phone,
            created_at: now,
            updated_at: now,
        };
        tables.directions.insert(direction.id, direction.clone());
        Ok(direction)
    }

    async fn list_directions(&self, owner: Option<UserId>) -> Result<Vec<Direction>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .directions
                .values()
                .filter(|d| owner.is_none_or(|uid| d.user_id == uid))
                .cloned()
                .collect(),
            |d| d.created_at,
        ))
    }

    async fn get_direction(&self, id: DirectionId) -> Result<Option<Direction>> {
        Ok(self.tables.read().await.directions.get(&id).cloned())
    }

    async fn update_direction(&self, id: DirectionId, patch: DirectionPatch) -> Result<Direction> {
        let mut tables = self.tables.write().await;
        let direction = tables
            .directions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Direction", id))?;
        set_if_some(&mut direction.name, patch.name);
        set_if_some(&mut direction.street, patch.street);
        set_if_some(&mut direction.city, patch.city);
        set_if_some(&mut direction.province, patch.province);
        if patch.postal_code.is_some() {
            direction.postal_code = patch.postal_code;
        }
        if patch.phone.is_some() {
            direction.phone = patch.phone;
        }
        direction.updated_at = Utc::now();
        Ok(direction.clone())
    }

    async fn delete_direction(&self, id: DirectionId) -> Result<()> {
        self.tables
            .write()
            .await
            .directions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("Direction", id))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, new: NewOrder) -> Result<OrderDetail> {
        let mut tables = self.tables.write().await;

        if let Some(user_id) = new.user_id
            && !tables.users.contains_key(&user_id)
        {
            return Err(StoreError::not_found("User", user_id));
        }

        let demands = stock_demands(
            new.items
                .iter()
                .map(|item| (item.model_id, item.size, item.quantity)),
        );

        // Check every guard before touching anything.
        for demand in &demands {
            let stock = tables
                .stock_for(demand.model_id, demand.size)
                .ok_or(StoreError::StockNotFound {
                    model_id: demand.model_id,
                    size: demand.size,
                })?;
            if stock.quantity < demand.quantity {
                return Err(StoreError::InsufficientStock {
                    model_id: demand.model_id,
                    size: demand.size,
                    requested: demand.quantity,
                    available: stock.quantity,
                });
            }
        }

        let now = Utc::now();
        for demand in &demands {
            if let Some(stock) = tables.stock_for_mut(demand.model_id, demand.size) {
                stock.quantity -= demand.quantity;
                stock.updated_at = now;
            }
        }

        let items: Vec<OrderItem> = new
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(),
                order_id: new.id,
                model_id: item.model_id,
                size: item.size,
                quantity: item.quantity,
                unit_price: Some(item.unit_price),
            })
            .collect();

        let order = Order {
            id: new.id,
            user_id: new.user_id,
            total: order_total(&items, Money::zero()),
            discount: Money::zero(),
            state: OrderState::Created,
            comments: new.comments,
            kind: new.kind,
            payment_link: None,
            paid: false,
            created_at: now,
            updated_at: now,
        };
        tables.orders.insert(order.id, order);
        tables.order_items.extend(items);

        tables.order_detail_or_missing(new.id)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDetail>> {
        Ok(self.tables.read().await.order_detail(id))
    }

    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|o| owner.is_none_or(|uid| o.user_id == Some(uid)))
                .cloned()
                .collect(),
            |o| o.created_at,
        ))
    }

    async fn cancel_order(&self, id: OrderId, cancel: Cancellation) -> Result<OrderDetail> {
        let mut tables = self.tables.write().await;
        let detail = tables.order_detail_or_missing(id)?;
        if let Some(expected) = cancel.only_in
            && detail.order.state != expected
        {
            return Err(StoreError::StateMismatch {
                id: id.to_string(),
                expected,
                actual: detail.order.state,
            });
        }

        let demands = stock_demands(
            detail
                .items
                .iter()
                .map(|item| (item.model_id, item.size, item.quantity)),
        );
        for demand in &demands {
            let stock = tables.stock_for(demand.model_id, demand.size).ok_or(
                StoreError::StockNotFound {
                    model_id: demand.model_id,
                    size: demand.size,
                },
            )?;
            if stock.quantity.checked_add(demand.quantity).is_none() {
                return Err(StoreError::QuantityOverflow {
                    model_id: demand.model_id,
                    size: demand.size,
                });
            }
        }

        let now = Utc::now();
        for demand in &demands {
            if let Some(stock) = tables.stock_for_mut(demand.model_id, demand.size) {
                shift_quantity(stock, demand.quantity, now)?;
            }
        }
        tables.order_items.retain(|item| item.order_id != id);
        tables.orders.remove(&id);

        if cancel.penalize_owner
            && let Some(user) = detail
                .order
                .user_id
                .and_then(|uid| tables.users.get_mut(&uid))
        {
            user.penalties += 1;
            user.updated_at = now;
        }

        Ok(detail)
    }

    async fn remove_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        removal: ItemRemoval,
    ) -> Result<OrderDetail> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&order_id) {
            return Err(StoreError::not_found("Order", order_id));
        }
        let position = tables
            .order_items
            .iter()
            .position(|item| item.id == item_id && item.order_id == order_id)
            .ok_or_else(|| StoreError::not_found("OrderItem", item_id))?;
        let item = tables.order_items[position].clone();
        if item.quantity <= 0 {
            return Err(StoreError::ItemExhausted {
                item_id: item_id.to_string(),
            });
        }

        let restored = match removal {
            ItemRemoval::Whole => item.quantity,
            ItemRemoval::OneUnit => 1,
        };
        let now = Utc::now();
        let stock = tables
            .stock_for_mut(item.model_id, item.size)
            .ok_or(StoreError::StockNotFound {
                model_id: item.model_id,
                size: item.size,
            })?;
        shift_quantity(stock, restored, now)?;

        if restored < item.quantity {
            tables.order_items[position].quantity -= restored;
        } else {
            tables.order_items.remove(position);
        }
        tables.recompute_total(order_id, now);

        tables.order_detail_or_missing(order_id)
    }

    async fn apply_discount(&self, id: OrderId, discount: Money) -> Result<OrderDetail> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        order.discount = discount;
        tables.recompute_total(id, Utc::now());
        tables.order_detail_or_missing(id)
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<OrderDetail> {
        let mut tables = self.tables.write().await;
        if let Some(reference) = &patch.payment_link
            && tables
                .orders
                .values()
                .any(|o| o.id != id && o.payment_link.as_ref() == Some(reference))
        {
            return Err(StoreError::Conflict(format!(
                "payment link {reference} is already attached to another order"
            )));
        }
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        set_if_some(&mut order.state, patch.state);
        if patch.comments.is_some() {
            order.comments = patch.comments;
        }
        if patch.payment_link.is_some() {
            order.payment_link = patch.payment_link;
        }
        set_if_some(&mut order.paid, patch.paid);
        order.updated_at = Utc::now();
        tables.order_detail_or_missing(id)
    }

    async fn find_order_by_payment_link(&self, reference: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.payment_link.as_deref() == Some(reference))
            .cloned())
    }

    async fn stale_orders(
        &self,
        state: OrderState,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<OrderId>> {
        let tables = self.tables.read().await;
        let mut stale: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| o.state == state && o.created_at < created_before)
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale.into_iter().map(|o| o.id).collect())
    }

    async fn sales_snapshot(&self, query: &OrderQuery) -> Result<SalesSnapshot> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| query.matches(o.state, o.created_at))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);

        let mut lines = Vec::new();
        for item in &tables.order_items {
            let Some(order) = tables.orders.get(&item.order_id) else {
                continue;
            };
            if !query.matches(order.state, order.created_at) {
                continue;
            }
            let model = tables
                .models
                .get(&item.model_id)
                .ok_or_else(|| StoreError::not_found("Model", item.model_id))?;
            let buyer_role = order
                .user_id
                .and_then(|uid| tables.users.get(&uid))
                .map(|u| u.role);
            lines.push(SalesLine {
                order_id: order.id,
                model_id: model.id,
                model_name: model.name.clone(),
                quantity: item.quantity,
                captured_price: item.unit_price,
                prices: model.prices,
                on_promotion: model.on_promotion,
                buyer_role,
            });
        }
        Ok(SalesSnapshot { orders, lines })
    }
}
