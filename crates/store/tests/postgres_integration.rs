//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Money, OrderId, OrderState, Role};
use sqlx::PgPool;
use store::{
    Cancellation, CatalogStore, ItemRemoval, Model, NewModel, NewOrder, NewOrderItem, NewProduct, NewStock,
    NewUser, OrderKind, OrderPatch, OrderQuery, OrderStore, PostgresStore, PriceTiers, StoreError,
    UserStore,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_schema.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, images, stocks, models, products, directions, users",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_model(store: &PostgresStore, sizes: &[(i32, i32)]) -> Model {
    let product = store
        .insert_product(NewProduct {
            name: "Sneakers".to_string(),
            description: Some("Canvas".to_string()),
        })
        .await
        .unwrap();
    let model = store
        .insert_model(NewModel {
            product_id: product.id,
            name: "Runner".to_string(),
            color: "White".to_string(),
            description: None,
            prices: PriceTiers {
                cost: Money::from_cents(2000),
                retail: Money::from_cents(5000),
                reseller: Money::from_cents(4000),
                allied: Money::from_cents(3500),
                promotional: Money::from_cents(3000),
            },
            on_promotion: false,
        })
        .await
        .unwrap();
    for &(size, quantity) in sizes {
        store
            .insert_stock(NewStock {
                model_id: model.id,
                size,
                quantity,
            })
            .await
            .unwrap();
    }
    model
}

fn order(model: &Model, lines: &[(i32, i32)]) -> NewOrder {
    NewOrder {
        id: OrderId::new(),
        user_id: None,
        kind: OrderKind::Normal,
        comments: None,
        items: lines
            .iter()
            .map(|&(size, quantity)| NewOrderItem {
                model_id: model.id,
                size,
                quantity,
                unit_price: Money::from_cents(5000),
            })
            .collect(),
    }
}

async fn quantity(store: &PostgresStore, model: &Model, size: i32) -> i32 {
    store
        .find_stock(model.id, size)
        .await
        .unwrap()
        .unwrap()
        .quantity
}

#[tokio::test]
async fn place_order_commits_items_and_decrements_stock() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 10), (38, 10)]).await;

    let detail = store
        .place_order(order(&model, &[(37, 2), (38, 3)]))
        .await
        .unwrap();

    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.order.total.cents(), 25000);
    assert_eq!(detail.order.state, OrderState::Created);
    assert_eq!(quantity(&store, &model, 37).await, 8);
    assert_eq!(quantity(&store, &model, 38).await, 7);
}

#[tokio::test]
async fn failed_guard_rolls_back_every_write() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 10), (38, 1)]).await;

    let err = store
        .place_order(order(&model, &[(37, 2), (38, 3)]))
        .await
        .unwrap_err();

    match err {
        StoreError::InsufficientStock {
            size,
            requested,
            available,
            ..
        } => {
            assert_eq!(size, 38);
            assert_eq!(requested, 3);
            assert_eq!(available, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(quantity(&store, &model, 37).await, 10);
    assert!(store.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_stock_row_reports_stock_not_found() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 10)]).await;

    let err = store
        .place_order(order(&model, &[(44, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::StockNotFound { size: 44, .. }));
}

#[tokio::test]
async fn cancel_restores_stock_and_penalizes_owner() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5)]).await;
    let user = store
        .insert_user(NewUser {
            email: "buyer@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Buyer".to_string(),
            phone: None,
            role: Role::Reseller,
        })
        .await
        .unwrap();

    let mut new = order(&model, &[(37, 4)]);
    new.user_id = Some(user.id);
    let detail = store.place_order(new).await.unwrap();
    assert_eq!(quantity(&store, &model, 37).await, 1);

    store
        .cancel_order(detail.order.id, Cancellation::expiry(true))
        .await
        .unwrap();

    assert_eq!(quantity(&store, &model, 37).await, 5);
    assert!(store.get_order(detail.order.id).await.unwrap().is_none());
    let user = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.penalties, 1);
}

#[tokio::test]
async fn expiry_refuses_order_that_was_paid() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5)]).await;
    let detail = store.place_order(order(&model, &[(37, 2)])).await.unwrap();
    store
        .update_order(
            detail.order.id,
            OrderPatch {
                state: Some(OrderState::Confirmed),
                paid: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = store
        .cancel_order(detail.order.id, Cancellation::expiry(true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::StateMismatch {
            actual: OrderState::Confirmed,
            ..
        }
    ));
    assert!(store.get_order(detail.order.id).await.unwrap().is_some());
    assert_eq!(quantity(&store, &model, 37).await, 3);
}

#[tokio::test]
async fn restock_overflow_is_rejected() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 10)]).await;
    let stock = store.find_stock(model.id, 37).await.unwrap().unwrap();

    let err = store.restock(stock.id, i32::MAX).await.unwrap_err();

    assert!(matches!(err, StoreError::QuantityOverflow { size: 37, .. }));
    assert_eq!(quantity(&store, &model, 37).await, 10);

    let err = store.restock(stock.id, -11).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 10, .. }));
}

#[tokio::test]
async fn remove_item_recomputes_total() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5), (38, 5)]).await;
    let detail = store
        .place_order(order(&model, &[(37, 2), (38, 1)]))
        .await
        .unwrap();
    let first = detail.items[0].id;
    let second = detail.items[1].id;

    let detail = store
        .remove_item(detail.order.id, first, ItemRemoval::OneUnit)
        .await
        .unwrap();
    assert_eq!(detail.order.total.cents(), 10000);
    assert_eq!(quantity(&store, &model, 37).await, 4);

    let detail = store
        .remove_item(detail.order.id, second, ItemRemoval::Whole)
        .await
        .unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.order.total.cents(), 5000);
    assert_eq!(quantity(&store, &model, 38).await, 5);
}

#[tokio::test]
async fn discount_is_subtracted_from_total() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5)]).await;
    let detail = store.place_order(order(&model, &[(37, 2)])).await.unwrap();

    let detail = store
        .apply_discount(detail.order.id, Money::from_cents(1500))
        .await
        .unwrap();

    assert_eq!(detail.order.discount.cents(), 1500);
    assert_eq!(detail.order.total.cents(), 8500);
}

#[tokio::test]
async fn payment_link_lookup_and_uniqueness() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5)]).await;
    let a = store.place_order(order(&model, &[(37, 1)])).await.unwrap();
    let b = store.place_order(order(&model, &[(37, 1)])).await.unwrap();

    let patch = OrderPatch {
        payment_link: Some("pay-123".to_string()),
        state: Some(OrderState::PaymentSent),
        ..Default::default()
    };
    store.update_order(a.order.id, patch.clone()).await.unwrap();

    let found = store
        .find_order_by_payment_link("pay-123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, a.order.id);
    assert_eq!(found.state, OrderState::PaymentSent);

    let err = store.update_order(b.order.id, patch).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn sales_snapshot_follows_state_filter() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 10)]).await;
    let confirmed = store.place_order(order(&model, &[(37, 2)])).await.unwrap();
    store.place_order(order(&model, &[(37, 3)])).await.unwrap();

    store
        .update_order(
            confirmed.order.id,
            OrderPatch {
                state: Some(OrderState::Confirmed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let sales = store.sales_snapshot(&OrderQuery::sales()).await.unwrap();
    assert_eq!(sales.orders.len(), 1);
    assert_eq!(sales.lines.len(), 1);
    assert_eq!(sales.lines[0].quantity, 2);
    assert_eq!(sales.lines[0].model_name, "Runner");
    assert_eq!(sales.lines[0].captured_price, Some(Money::from_cents(5000)));

    let all = store.sales_snapshot(&OrderQuery::new()).await.unwrap();
    assert_eq!(all.orders.len(), 2);
    assert_eq!(all.lines.len(), 2);
}

#[tokio::test]
async fn duplicate_stock_row_conflicts() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(37, 5)]).await;

    let err = store
        .insert_stock(NewStock {
            model_id: model.id,
            size: 37,
            quantity: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let store = get_test_store().await;
    let model = seed_model(&store, &[(40, 5)]).await;

    let attempts = (0..10).map(|_| {
        let store = store.clone();
        let new = order(&model, &[(40, 1)]);
        tokio::spawn(async move { store.place_order(new).await })
    });
    let results = futures_util::future::join_all(attempts).await;

    let placed = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();

    assert_eq!(placed, 5);
    assert_eq!(quantity(&store, &model, 40).await, 0);
    assert_eq!(store.list_orders(None).await.unwrap().len(), 5);
}
