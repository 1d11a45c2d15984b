//! Integration tests: OrderWorkflow → InMemoryStore → SalesReporter.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{ModelId, Money, OrderId, OrderState, Role};
use domain::{NormalLine, OrderLines, OrderWorkflow, PlaceOrder, services::LogMailer};
use reporting::{ReportQuery, SalesReporter};
use store::{
    CatalogStore, InMemoryStore, Model, ModelPatch, NewModel, NewProduct, NewStock, NewUser,
    OrderPatch, OrderStore, PriceTiers, UserStore,
};

fn setup() -> (
    InMemoryStore,
    OrderWorkflow<InMemoryStore>,
    SalesReporter<InMemoryStore>,
) {
    let store = InMemoryStore::new();
    let workflow = OrderWorkflow::new(store.clone(), Arc::new(LogMailer));
    let reporter = SalesReporter::new(store.clone());
    (store, workflow, reporter)
}

async fn seed_model(store: &InMemoryStore, name: &str) -> Model {
    let product = store
        .insert_product(NewProduct {
            name: format!("{name} line"),
            description: None,
        })
        .await
        .unwrap();
    let model = store
        .insert_model(NewModel {
            product_id: product.id,
            name: name.to_string(),
            color: "Black".to_string(),
            description: None,
            prices: PriceTiers {
                cost: Money::from_cents(1000),
                retail: Money::from_cents(3000),
                reseller: Money::from_cents(2500),
                allied: Money::from_cents(2200),
                promotional: Money::from_cents(2000),
            },
            on_promotion: false,
        })
        .await
        .unwrap();
    for size in [37, 38, 39] {
        store
            .insert_stock(NewStock {
                model_id: model.id,
                size,
                quantity: 100,
            })
            .await
            .unwrap();
    }
    model
}

async fn place(
    workflow: &OrderWorkflow<InMemoryStore>,
    user: Option<common::UserId>,
    model_id: ModelId,
    lines: &[(i32, i32)],
) -> OrderId {
    let lines = OrderLines::Normal(
        lines
            .iter()
            .map(|&(size, quantity)| NormalLine {
                model_id,
                size,
                quantity,
            })
            .collect(),
    );
    workflow
        .place_order(PlaceOrder::new(user, lines))
        .await
        .unwrap()
        .order
        .id
}

async fn set_state(store: &InMemoryStore, id: OrderId, state: OrderState) {
    store
        .update_order(
            id,
            OrderPatch {
                state: Some(state),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_units_sold_match_confirmed_items_in_range() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;
    let walker = seed_model(&store, "Walker").await;

    let confirmed = place(&workflow, None, runner.id, &[(37, 2), (38, 3)]).await;
    set_state(&store, confirmed, OrderState::Confirmed).await;

    let delivered = place(&workflow, None, walker.id, &[(39, 4)]).await;
    set_state(&store, delivered, OrderState::Delivered).await;

    // Never counted: still awaiting payment.
    let pending = place(&workflow, None, walker.id, &[(37, 10)]).await;
    set_state(&store, pending, OrderState::PaymentSent).await;

    // Outside the range.
    let old = place(&workflow, None, runner.id, &[(37, 7)]).await;
    set_state(&store, old, OrderState::Confirmed).await;
    store
        .backdate_order(old, Utc::now() - Duration::days(30))
        .await
        .unwrap();

    let query = ReportQuery::new().from(Utc::now() - Duration::days(1));
    let report = reporter.report(&query).await.unwrap();

    assert_eq!(report.order_count, 2);
    assert_eq!(report.units_sold, 9);
    assert_eq!(report.total_sales, Money::from_cents(9 * 3000));
    assert_eq!(report.gross_revenue, Money::from_cents(9 * 3000));
    assert_eq!(report.net_profit, Money::from_cents(9 * 2000));

    let best = report.best_seller.unwrap();
    assert_eq!(best.model_id, runner.id);
    assert_eq!(best.units, 5);

    let all_time = reporter.report(&ReportQuery::new()).await.unwrap();
    assert_eq!(all_time.units_sold, 16);
    assert_eq!(all_time.best_seller.unwrap().units, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_orders_and_lines_agree_while_orders_confirm() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;

    let mut pending = Vec::new();
    for _ in 0..40 {
        pending.push(place(&workflow, None, runner.id, &[(37, 1)]).await);
    }

    let confirmer = {
        let store = store.clone();
        tokio::spawn(async move {
            for id in pending {
                set_state(&store, id, OrderState::Confirmed).await;
                tokio::task::yield_now().await;
            }
        })
    };

    // One unit at retail per order: every report must count as many units
    // as orders and as much revenue as sales.
    let mut last = 0;
    while last < 40 {
        let report = reporter.report(&ReportQuery::new()).await.unwrap();
        assert_eq!(report.units_sold, report.order_count as i64);
        assert_eq!(report.total_sales, report.gross_revenue);
        last = report.order_count;
        tokio::task::yield_now().await;
    }
    confirmer.await.unwrap();
}

#[tokio::test]
async fn test_explicit_states_override_default() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;

    place(&workflow, None, runner.id, &[(37, 2)]).await;
    let confirmed = place(&workflow, None, runner.id, &[(38, 1)]).await;
    set_state(&store, confirmed, OrderState::Confirmed).await;

    let created = reporter
        .report(&ReportQuery::new().states(vec![OrderState::Created]))
        .await
        .unwrap();
    assert_eq!(created.order_count, 1);
    assert_eq!(created.units_sold, 2);
}

#[tokio::test]
async fn test_discount_reduces_total_sales_not_revenue() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;

    let id = place(&workflow, None, runner.id, &[(37, 2)]).await;
    workflow
        .apply_discount(id, Money::from_cents(1000))
        .await
        .unwrap();
    set_state(&store, id, OrderState::Confirmed).await;

    let report = reporter.report(&ReportQuery::new()).await.unwrap();
    assert_eq!(report.total_sales, Money::from_cents(5000));
    assert_eq!(report.gross_revenue, Money::from_cents(6000));
}

#[tokio::test]
async fn test_promotion_and_captured_prices() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;
    let reseller = store
        .insert_user(NewUser {
            email: "shop@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Shop".to_string(),
            phone: None,
            role: Role::Reseller,
        })
        .await
        .unwrap();

    let id = place(&workflow, Some(reseller.id), runner.id, &[(37, 2)]).await;
    set_state(&store, id, OrderState::Confirmed).await;

    let report = reporter.report(&ReportQuery::new()).await.unwrap();
    assert_eq!(report.gross_revenue, Money::from_cents(2 * 2500));

    // A promotion started after the sale still prices the line promotionally.
    store
        .update_model(
            runner.id,
            ModelPatch {
                on_promotion: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let report = reporter.report(&ReportQuery::new()).await.unwrap();
    assert_eq!(report.gross_revenue, Money::from_cents(2 * 2000));
    assert_eq!(report.net_profit, Money::from_cents(2 * 1000));
}

#[tokio::test]
async fn test_stock_total() {
    let (store, workflow, reporter) = setup();
    let runner = seed_model(&store, "Runner").await;
    assert_eq!(reporter.stock_total().await.unwrap(), 300);

    place(&workflow, None, runner.id, &[(37, 5)]).await;
    assert_eq!(reporter.stock_total().await.unwrap(), 295);
}

#[tokio::test]
async fn test_report_serializes() {
    let (_, _, reporter) = setup();
    let report = reporter.report(&ReportQuery::new()).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["order_count"], 0);
    assert_eq!(json["states"], serde_json::json!(["Confirmed", "Delivered"]));
    assert!(json["best_seller"].is_null());
}
