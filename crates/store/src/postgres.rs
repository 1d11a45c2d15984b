use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    DirectionId, ImageId, ModelId, Money, OrderId, OrderItemId, OrderState, ProductId, Role,
    StockId, UserId,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::entities::*;
use crate::store::{
    Cancellation, CatalogStore, ItemRemoval, NewOrder, OrderStore, StockDemand, UserStore,
    order_total, stock_demands,
};
use crate::{OrderQuery, Result, SalesLine, SalesSnapshot, StoreError};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, phone, role, penalties, created_at, updated_at";
const DIRECTION_COLUMNS: &str =
    "id, user_id, name, street, city, province, postal_code, phone, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, description, created_at, updated_at";
const MODEL_COLUMNS: &str = "id, product_id, name, color, description, cost_price, retail_price, \
     reseller_price, allied_price, promotional_price, on_promotion, created_at, updated_at";
const STOCK_COLUMNS: &str = "id, model_id, size, quantity, created_at, updated_at";
const IMAGE_COLUMNS: &str = "id, model_id, url, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, total, discount, state, comments, kind, payment_link, \
     paid, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, model_id, size, quantity, unit_price";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            role: Role::from_str(&role).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            penalties: row.try_get("penalties")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_direction(row: PgRow) -> Result<Direction> {
        Ok(Direction {
            id: DirectionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            name: row.try_get("name")?,
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            province: row.try_get("province")?,
            postal_code: row.try_get("postal_code")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_prices(row: &PgRow) -> Result<PriceTiers> {
        let cents = |column: &str| -> Result<Money> {
            Ok(Money::from_cents(row.try_get::<i64, _>(column)?))
        };
        Ok(PriceTiers {
            cost: cents("cost_price")?,
            retail: cents("retail_price")?,
            reseller: cents("reseller_price")?,
            allied: cents("allied_price")?,
            promotional: cents("promotional_price")?,
        })
    }

    fn row_to_model(row: PgRow) -> Result<Model> {
        Ok(Model {
            id: ModelId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            name: row.try_get("name")?,
            color: row.try_get("color")?,
            description: row.try_get("description")?,
            prices: Self::row_to_prices(&row)?,
            on_promotion: row.try_get("on_promotion")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_stock(row: PgRow) -> Result<Stock> {
        Ok(Stock {
            id: StockId::from_uuid(row.try_get::<Uuid, _>("id")?),
            model_id: ModelId::from_uuid(row.try_get::<Uuid, _>("model_id")?),
            size: row.try_get("size")?,
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_image(row: PgRow) -> Result<Image> {
        Ok(Image {
            id: ImageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            model_id: ModelId::from_uuid(row.try_get::<Uuid, _>("model_id")?),
            url: row.try_get("url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let state: String = row.try_get("state")?;
        let kind: String = row.try_get("kind")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row
                .try_get::<Option<Uuid>, _>("user_id")?
                .map(UserId::from_uuid),
            total: Money::from_cents(row.try_get("total")?),
            discount: Money::from_cents(row.try_get("discount")?),
            state: OrderState::from_str(&state).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            comments: row.try_get("comments")?,
            kind: OrderKind::parse(&kind)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown order kind: {kind}")))?,
            payment_link: row.try_get("payment_link")?,
            paid: row.try_get("paid")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            model_id: ModelId::from_uuid(row.try_get::<Uuid, _>("model_id")?),
            size: row.try_get("size")?,
            quantity: row.try_get("quantity")?,
            unit_price: row
                .try_get::<Option<i64>, _>("unit_price")?
                .map(Money::from_cents),
        })
    }

    /// Maps unique and foreign-key violations to `Conflict`.
    fn write_error(e: sqlx::Error, context: &str) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return StoreError::Conflict(format!("{context}: {}", db_err.message()));
        }
        StoreError::Database(e)
    }

    async fn exists(conn: &mut PgConnection, table: &'static str, id: Uuid) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
        Ok(sqlx::query_scalar(&sql).bind(id).fetch_one(conn).await?)
    }

    async fn load_items(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn load_order_detail(
        conn: &mut PgConnection,
        id: OrderId,
    ) -> Result<Option<OrderDetail>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };
        let order = Self::row_to_order(row)?;

        let items = Self::load_items(&mut *conn, id).await?;

        let user = match order.user_id {
            Some(user_id) => {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
                sqlx::query(&sql)
                    .bind(user_id.as_uuid())
                    .fetch_optional(&mut *conn)
                    .await?
                    .map(Self::row_to_user)
                    .transpose()?
            }
            None => None,
        };

        Ok(Some(OrderDetail { order, items, user }))
    }

    async fn require_order_detail(conn: &mut PgConnection, id: OrderId) -> Result<OrderDetail> {
        Self::load_order_detail(conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    /// Takes a row lock on the order so concurrent reversals serialize.
    /// Locks the order row and returns its current state.
    async fn lock_order(conn: &mut PgConnection, id: OrderId) -> Result<OrderState> {
        let state: String = sqlx::query_scalar("SELECT state FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        OrderState::from_str(&state).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn recompute_total(conn: &mut PgConnection, id: OrderId) -> Result<()> {
        let items = Self::load_items(&mut *conn, id).await?;
        let discount: i64 = sqlx::query_scalar("SELECT discount FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *conn)
            .await?;
        let total = order_total(&items, Money::from_cents(discount));
        sqlx::query("UPDATE orders SET total = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(total.cents())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Adds `delta` to the stock row of (model, size).
    async fn shift_stock(
        conn: &mut PgConnection,
        model_id: ModelId,
        size: i32,
        delta: i32,
    ) -> Result<()> {
        let current: i32 = sqlx::query_scalar(
            "SELECT quantity FROM stocks WHERE model_id = $1 AND size = $2 FOR UPDATE",
        )
        .bind(model_id.as_uuid())
        .bind(size)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::StockNotFound { model_id, size })?;
        let quantity = current
            .checked_add(delta)
            .ok_or(StoreError::QuantityOverflow { model_id, size })?;

        sqlx::query(
            r#"
            UPDATE stocks SET quantity = $1, updated_at = NOW()
            WHERE model_id = $2 AND size = $3
            "#,
        )
        .bind(quantity)
        .bind(model_id.as_uuid())
        .bind(size)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Works out why a guarded decrement matched no row.
    async fn stock_shortfall(conn: &mut PgConnection, demand: &StockDemand) -> StoreError {
        let available = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM stocks WHERE model_id = $1 AND size = $2",
        )
        .bind(demand.model_id.as_uuid())
        .bind(demand.size)
        .fetch_optional(conn)
        .await;

        match available {
            Ok(Some(available)) => StoreError::InsufficientStock {
                model_id: demand.model_id,
                size: demand.size,
                requested: demand.quantity,
                available,
            },
            Ok(None) => StoreError::StockNotFound {
                model_id: demand.model_id,
                size: demand.size,
            },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn stocks_for_models(&self, model_ids: &[Uuid]) -> Result<HashMap<ModelId, Vec<Stock>>> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stocks WHERE model_id = ANY($1) ORDER BY size ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(model_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut grouped: HashMap<ModelId, Vec<Stock>> = HashMap::new();
        for row in rows {
            let stock = Self::row_to_stock(row)?;
            grouped.entry(stock.model_id).or_default().push(stock);
        }
        Ok(grouped)
    }

    async fn images_for_models(&self, model_ids: &[Uuid]) -> Result<HashMap<ModelId, Vec<Image>>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE model_id = ANY($1) ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(model_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut grouped: HashMap<ModelId, Vec<Image>> = HashMap::new();
        for row in rows {
            let image = Self::row_to_image(row)?;
            grouped.entry(image.model_id).or_default().push(image);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let sql = format!(
            "INSERT INTO products (id, name, description) VALUES ($1, $2, $3) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(ProductId::new().as_uuid())
            .bind(&new.name)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_product(row)
    }

    async fn list_products(&self) -> Result<Vec<ProductWithModels>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC");
        let products = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;

        let sql = format!("SELECT {MODEL_COLUMNS} FROM models ORDER BY created_at DESC");
        let mut models: HashMap<ProductId, Vec<Model>> = HashMap::new();
        for row in sqlx::query(&sql).fetch_all(&self.pool).await? {
            let model = Self::row_to_model(row)?;
            models.entry(model.product_id).or_default().push(model);
        }

        Ok(products
            .into_iter()
            .map(|product| ProductWithModels {
                models: models.remove(&product.id).unwrap_or_default(),
                product,
            })
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductDetail>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let product = Self::row_to_product(row)?;

        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE product_id = $1 ORDER BY created_at DESC"
        );
        let models = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_model)
            .collect::<Result<Vec<_>>>()?;

        let model_ids: Vec<Uuid> = models.iter().map(|m| m.id.as_uuid()).collect();
        let mut stocks = self.stocks_for_models(&model_ids).await?;
        let mut images = self.images_for_models(&model_ids).await?;

        let models = models
            .into_iter()
            .map(|model| ModelDetail {
                stocks: stocks.remove(&model.id).unwrap_or_default(),
                images: images.remove(&model.id).unwrap_or_default(),
                model,
            })
            .collect();

        Ok(Some(ProductDetail { product, models }))
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        let sql = format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.name)
            .bind(&patch.description)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_product)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::write_error(e, "product still has models"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn insert_model(&self, new: NewModel) -> Result<Model> {
        let mut conn = self.pool.acquire().await?;
        if !Self::exists(&mut conn, "products", new.product_id.as_uuid()).await? {
            return Err(StoreError::not_found("Product", new.product_id));
        }
        let sql = format!(
            r#"
            INSERT INTO models (id, product_id, name, color, description, cost_price, retail_price,
                                reseller_price, allied_price, promotional_price, on_promotion)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MODEL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(ModelId::new().as_uuid())
            .bind(new.product_id.as_uuid())
            .bind(&new.name)
            .bind(&new.color)
            .bind(&new.description)
            .bind(new.prices.cost.cents())
            .bind(new.prices.retail.cents())
            .bind(new.prices.reseller.cents())
            .bind(new.prices.allied.cents())
            .bind(new.prices.promotional.cents())
            .bind(new.on_promotion)
            .fetch_one(&mut *conn)
            .await?;
        Self::row_to_model(row)
    }

    async fn list_models(&self) -> Result<Vec<ModelWithStock>> {
        let sql = format!("SELECT {MODEL_COLUMNS} FROM models ORDER BY created_at DESC");
        let models = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_model)
            .collect::<Result<Vec<_>>>()?;

        let model_ids: Vec<Uuid> = models.iter().map(|m| m.id.as_uuid()).collect();
        let mut stocks = self.stocks_for_models(&model_ids).await?;

        Ok(models
            .into_iter()
            .map(|model| {
                let stocks = stocks.remove(&model.id).unwrap_or_default();
                let total_stock = stocks.iter().map(|s| i64::from(s.quantity)).sum();
                ModelWithStock {
                    model,
                    stocks,
                    total_stock,
                }
            })
            .collect())
    }

    async fn get_model(&self, id: ModelId) -> Result<Option<Model>> {
        let sql = format!("SELECT {MODEL_COLUMNS} FROM models WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_model)
            .transpose()
    }

    async fn update_model(&self, id: ModelId, patch: ModelPatch) -> Result<Model> {
        let prices = patch.prices;
        let sql = format!(
            r#"
            UPDATE models SET
                name = COALESCE($2, name),
                color = COALESCE($3, color),
                description = COALESCE($4, description),
                cost_price = COALESCE($5, cost_price),
                retail_price = COALESCE($6, retail_price),
                reseller_price = COALESCE($7, reseller_price),
                allied_price = COALESCE($8, allied_price),
                promotional_price = COALESCE($9, promotional_price),
                on_promotion = COALESCE($10, on_promotion),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MODEL_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.name)
            .bind(&patch.color)
            .bind(&patch.description)
            .bind(prices.map(|p| p.cost.cents()))
            .bind(prices.map(|p| p.retail.cents()))
            .bind(prices.map(|p| p.reseller.cents()))
            .bind(prices.map(|p| p.allied.cents()))
            .bind(prices.map(|p| p.promotional.cents()))
            .bind(patch.on_promotion)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_model)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Model", id))
    }

    async fn delete_model(&self, id: ModelId) -> Result<()> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::write_error(e, "model is referenced by orders"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Model", id));
        }
        Ok(())
    }

    async fn insert_stock(&self, new: NewStock) -> Result<Stock> {
        let mut conn = self.pool.acquire().await?;
        if !Self::exists(&mut conn, "models", new.model_id.as_uuid()).await? {
            return Err(StoreError::not_found("Model", new.model_id));
        }
        let sql = format!(
            "INSERT INTO stocks (id, model_id, size, quantity) VALUES ($1, $2, $3, $4) RETURNING {STOCK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(StockId::new().as_uuid())
            .bind(new.model_id.as_uuid())
            .bind(new.size)
            .bind(new.quantity)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                Self::write_error(
                    e,
                    &format!("stock for model {} size {}", new.model_id, new.size),
                )
            })?;
        Self::row_to_stock(row)
    }

    async fn list_stocks(&self) -> Result<Vec<Stock>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM stocks ORDER BY created_at DESC");
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_stock)
            .collect()
    }

    async fn get_stock(&self, id: StockId) -> Result<Option<Stock>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_stock)
            .transpose()
    }

    async fn find_stock(&self, model_id: ModelId, size: i32) -> Result<Option<Stock>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE model_id = $1 AND size = $2");
        sqlx::query(&sql)
            .bind(model_id.as_uuid())
            .bind(size)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_stock)
            .transpose()
    }

    async fn restock(&self, id: StockId, delta: i32) -> Result<Stock> {
        let sql = format!(
            r#"
            UPDATE stocks SET quantity = (quantity::bigint + $2)::integer, updated_at = NOW()
            WHERE id = $1 AND quantity::bigint + $2 BETWEEN 0 AND $3
            RETURNING {STOCK_COLUMNS}
            "#
        );
        if let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(i64::from(delta))
            .bind(i64::from(i32::MAX))
            .fetch_optional(&self.pool)
            .await?
        {
            return Self::row_to_stock(row);
        }

        match self.get_stock(id).await? {
            Some(stock) if stock.quantity.checked_add(delta).is_none() => {
                Err(StoreError::QuantityOverflow {
                    model_id: stock.model_id,
                    size: stock.size,
                })
            }
            Some(stock) => Err(StoreError::InsufficientStock {
                model_id: stock.model_id,
                size: stock.size,
                requested: delta.saturating_neg(),
                available: stock.quantity,
            }),
            None => Err(StoreError::not_found("Stock", id)),
        }
    }

    async fn delete_stock(&self, id: StockId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT model_id, size FROM stocks WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("Stock", id))?;
        let model_id: Uuid = row.try_get("model_id")?;
        let size: i32 = row.try_get("size")?;

        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM order_items WHERE model_id = $1 AND size = $2)",
        )
        .bind(model_id)
        .bind(size)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(StoreError::Conflict(format!(
                "stock for model {model_id} size {size} is referenced by orders"
            )));
        }

        sqlx::query("DELETE FROM stocks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn total_stock_quantity(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stocks")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn insert_images(&self, model_id: ModelId, urls: Vec<String>) -> Result<Vec<Image>> {
        let mut tx = self.pool.begin().await?;
        if !Self::exists(&mut tx, "models", model_id.as_uuid()).await? {
            return Err(StoreError::not_found("Model", model_id));
        }
        let sql = format!(
            "INSERT INTO images (id, model_id, url) VALUES ($1, $2, $3) RETURNING {IMAGE_COLUMNS}"
        );
        let mut images = Vec::with_capacity(urls.len());
        for url in urls {
            let row = sqlx::query(&sql)
                .bind(ImageId::new().as_uuid())
                .bind(model_id.as_uuid())
                .bind(url)
                .fetch_one(&mut *tx)
                .await?;
            images.push(Self::row_to_image(row)?);
        }
        tx.commit().await?;
        Ok(images)
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at DESC");
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_image)
            .collect()
    }

    async fn get_image(&self, id: ImageId) -> Result<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_image)
            .transpose()
    }

    async fn update_image(&self, id: ImageId, url: String) -> Result<Image> {
        let sql = format!(
            "UPDATE images SET url = $2, updated_at = NOW() WHERE id = $1 RETURNING {IMAGE_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_image)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Image", id))
    }

    async fn delete_image(&self, id: ImageId) -> Result<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Image", id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, new: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, phone, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(UserId::new().as_uuid())
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.name)
            .bind(&new.phone)
            .bind(new.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Self::write_error(e, &format!("email {} is already registered", new.email))
            })?;
        Self::row_to_user(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query(&sql)
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role <> $1 ORDER BY created_at DESC"
        );
        sqlx::query(&sql)
            .bind(Role::Admin.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_user)
            .collect()
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                role = COALESCE($4, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.name)
            .bind(&patch.phone)
            .bind(patch.role.map(|r| r.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("User", id))
    }

    async fn insert_direction(&self, new: NewDirection) -> Result<Direction> {
        let mut conn = self.pool.acquire().await?;
        if !Self::exists(&mut conn, "users", new.user_id.as_uuid()).await? {
            return Err(StoreError::not_found("User", new.user_id));
        }
        let sql = format!(
            r#"
            INSERT INTO directions (id, user_id, name, street, city, province, postal_code, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DIRECTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(DirectionId::new().as_uuid())
            .bind(new.user_id.as_uuid())
            .bind(&new.name)
            .bind(&new.street)
            .bind(&new.city)
            .bind(&new.province)
            .bind(&new.postal_code)
            .bind(&new.phone)
            .fetch_one(&mut *conn)
            .await?;
        Self::row_to_direction(row)
    }

    async fn list_directions(&self, owner: Option<UserId>) -> Result<Vec<Direction>> {
        let sql = format!(
            r#"
            SELECT {DIRECTION_COLUMNS} FROM directions
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#
        );
        sqlx::query(&sql)
            .bind(owner.map(|id| id.as_uuid()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_direction)
            .collect()
    }

    async fn get_direction(&self, id: DirectionId) -> Result<Option<Direction>> {
        let sql = format!("SELECT {DIRECTION_COLUMNS} FROM directions WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_direction)
            .transpose()
    }

    async fn update_direction(&self, id: DirectionId, patch: DirectionPatch) -> Result<Direction> {
        let sql = format!(
            r#"
            UPDATE directions SET
                name = COALESCE($2, name),
                street = COALESCE($3, street),
                city = COALESCE($4, city),
                province = COALESCE($5, province),
                postal_code = COALESCE($6, postal_code),
                phone = COALESCE($7, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DIRECTION_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.name)
            .bind(&patch.street)
            .bind(&patch.city)
            .bind(&patch.province)
            .bind(&patch.postal_code)
            .bind(&patch.phone)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_direction)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Direction", id))
    }

    async fn delete_direction(&self, id: DirectionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM directions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Direction", id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip(self, new), fields(order_id = %new.id, items = new.items.len()))]
    async fn place_order(&self, new: NewOrder) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        if let Some(user_id) = new.user_id
            && !Self::exists(&mut tx, "users", user_id.as_uuid()).await?
        {
            return Err(StoreError::not_found("User", user_id));
        }

        let total: Money = new
            .items
            .iter()
            .map(|item| item.unit_price.multiply(item.quantity.max(0).unsigned_abs()))
            .sum();

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total, discount, state, comments, kind, paid)
            VALUES ($1, $2, $3, 0, $4, $5, $6, FALSE)
            "#,
        )
        .bind(new.id.as_uuid())
        .bind(new.user_id.map(|id| id.as_uuid()))
        .bind(total.non_negative().cents())
        .bind(OrderState::Created.as_str())
        .bind(&new.comments)
        .bind(new.kind.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::write_error(e, "order"))?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, model_id, size, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(OrderItemId::new().as_uuid())
            .bind(new.id.as_uuid())
            .bind(item.model_id.as_uuid())
            .bind(item.size)
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    StoreError::StockNotFound {
                        model_id: item.model_id,
                        size: item.size,
                    }
                }
                other => StoreError::Database(other),
            })?;
        }

        // Guarded decrements, evaluated against the row at commit time.
        for demand in stock_demands(
            new.items
                .iter()
                .map(|item| (item.model_id, item.size, item.quantity)),
        ) {
            let result = sqlx::query(
                r#"
                UPDATE stocks SET quantity = quantity - $1, updated_at = NOW()
                WHERE model_id = $2 AND size = $3 AND quantity >= $1
                "#,
            )
            .bind(demand.quantity)
            .bind(demand.model_id.as_uuid())
            .bind(demand.size)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let err = Self::stock_shortfall(&mut tx, &demand).await;
                tracing::debug!(error = %err, "guarded stock decrement rejected");
                metrics::counter!("store_stock_guard_rejections_total").increment(1);
                return Err(err);
            }
        }

        let detail = Self::require_order_detail(&mut tx, new.id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDetail>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_order_detail(&mut conn, id).await
    }

    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#
        );
        sqlx::query(&sql)
            .bind(owner.map(|id| id.as_uuid()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_order)
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_order(&self, id: OrderId, cancel: Cancellation) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await?;
        let state = Self::lock_order(&mut tx, id).await?;
        if let Some(expected) = cancel.only_in
            && state != expected
        {
            return Err(StoreError::StateMismatch {
                id: id.to_string(),
                expected,
                actual: state,
            });
        }
        let detail = Self::require_order_detail(&mut tx, id).await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for demand in stock_demands(
            detail
                .items
                .iter()
                .map(|item| (item.model_id, item.size, item.quantity)),
        ) {
            Self::shift_stock(&mut tx, demand.model_id, demand.size, demand.quantity).await?;
        }

        if cancel.penalize_owner && let Some(user_id) = detail.order.user_id {
            sqlx::query(
                "UPDATE users SET penalties = penalties + 1, updated_at = NOW() WHERE id = $1",
            )
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(detail)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        removal: ItemRemoval,
    ) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await?;
        Self::lock_order(&mut tx, order_id).await?;

        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1 AND order_id = $2");
        let item = sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .map(Self::row_to_item)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("OrderItem", item_id))?;

        if item.quantity <= 0 {
            return Err(StoreError::ItemExhausted {
                item_id: item_id.to_string(),
            });
        }

        let restored = match removal {
            ItemRemoval::Whole => item.quantity,
            ItemRemoval::OneUnit => 1,
        };
        Self::shift_stock(&mut tx, item.model_id, item.size, restored).await?;

        if restored < item.quantity {
            sqlx::query("UPDATE order_items SET quantity = quantity - $2 WHERE id = $1")
                .bind(item_id.as_uuid())
                .bind(restored)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("DELETE FROM order_items WHERE id = $1")
                .bind(item_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        Self::recompute_total(&mut tx, order_id).await?;
        let detail = Self::require_order_detail(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    async fn apply_discount(&self, id: OrderId, discount: Money) -> Result<OrderDetail> {
        let mut tx = self.pool.begin().await?;
        Self::lock_order(&mut tx, id).await?;
        sqlx::query("UPDATE orders SET discount = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(discount.cents())
            .execute(&mut *tx)
            .await?;
        Self::recompute_total(&mut tx, id).await?;
        let detail = Self::require_order_detail(&mut tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<OrderDetail> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                state = COALESCE($2, state),
                comments = COALESCE($3, comments),
                payment_link = COALESCE($4, payment_link),
                paid = COALESCE($5, paid),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(patch.state.map(|s| s.as_str()))
        .bind(&patch.comments)
        .bind(&patch.payment_link)
        .bind(patch.paid)
        .execute(&mut *conn)
        .await
        .map_err(|e| Self::write_error(e, "payment link is already attached to another order"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", id));
        }
        Self::require_order_detail(&mut conn, id).await
    }

    async fn find_order_by_payment_link(&self, reference: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_link = $1");
        sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn stale_orders(
        &self,
        state: OrderState,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<OrderId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE state = $1 AND created_at < $2 ORDER BY created_at ASC",
        )
        .bind(state.as_str())
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn sales_snapshot(&self, query: &OrderQuery) -> Result<SalesSnapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let orders = Self::sales_orders(&mut tx, query).await?;
        let lines = Self::sales_lines(&mut tx, query).await?;
        tx.commit().await?;
        Ok(SalesSnapshot { orders, lines })
    }
}

impl PostgresStore {
    async fn sales_orders(conn: &mut PgConnection, query: &OrderQuery) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
              AND (cardinality($3::text[]) = 0 OR state = ANY($3))
            ORDER BY created_at ASC
            "#
        );
        sqlx::query(&sql)
            .bind(query.from)
            .bind(query.to)
            .bind(query.state_names())
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(Self::row_to_order)
            .collect()
    }

    async fn sales_lines(conn: &mut PgConnection, query: &OrderQuery) -> Result<Vec<SalesLine>> {
        let rows = sqlx::query(
            r#"
            SELECT oi.order_id, oi.model_id, m.name AS model_name, oi.quantity, oi.unit_price,
                   m.cost_price, m.retail_price, m.reseller_price, m.allied_price,
                   m.promotional_price, m.on_promotion, u.role AS buyer_role
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN models m ON m.id = oi.model_id
            LEFT JOIN users u ON u.id = o.user_id
            WHERE ($1::timestamptz IS NULL OR o.created_at >= $1)
              AND ($2::timestamptz IS NULL OR o.created_at < $2)
              AND (cardinality($3::text[]) = 0 OR o.state = ANY($3))
            ORDER BY o.created_at ASC, oi.position ASC
            "#,
        )
        .bind(query.from)
        .bind(query.to)
        .bind(query.state_names())
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                let buyer_role = row
                    .try_get::<Option<String>, _>("buyer_role")?
                    .map(|role| Role::from_str(&role))
                    .transpose()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(SalesLine {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    model_id: ModelId::from_uuid(row.try_get::<Uuid, _>("model_id")?),
                    model_name: row.try_get("model_name")?,
                    quantity: row.try_get("quantity")?,
                    captured_price: row
                        .try_get::<Option<i64>, _>("unit_price")?
                        .map(Money::from_cents),
                    prices: Self::row_to_prices(&row)?,
                    on_promotion: row.try_get("on_promotion")?,
                    buyer_role,
                })
            })
            .collect()
    }
}
