//! HTTP API server with observability for the wholesale ordering backend.
//!
//! Provides REST endpoints for the catalog, users, orders, sales reports and
//! payment notifications, with structured logging (tracing) and Prometheus
//! metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::get;
use domain::services::{ImageStorage, Mailer};
use domain::{CatalogService, OrderWorkflow, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use reporting::SalesReporter;
use secrecy::SecretString;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::TokenService;
use error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderWorkflow<S>,
    pub catalog: CatalogService<S>,
    pub users: UserService<S>,
    pub reports: SalesReporter<S>,
    pub tokens: TokenService,
    /// Key for payment webhook signatures. `None` disables the webhook.
    pub webhook_secret: Option<SecretString>,
}

impl<S: Store + Clone> AppState<S> {
    /// Wires every service over one store.
    pub fn new(
        store: S,
        mailer: Arc<dyn Mailer>,
        images: Arc<dyn ImageStorage>,
        tokens: TokenService,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            orders: OrderWorkflow::new(store.clone(), mailer.clone()),
            catalog: CatalogService::new(store.clone(), images),
            users: UserService::new(store.clone(), mailer),
            reports: SalesReporter::new(store),
            tokens,
            webhook_secret,
        }
    }
}

impl<S: Store> FromRef<Arc<AppState<S>>> for TokenService {
    fn from_ref(state: &Arc<AppState<S>>) -> Self {
        state.tokens.clone()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let v1 = Router::new()
        .nest("/users", routes::users::router::<S>())
        .nest("/directions", routes::directions::router::<S>())
        .nest("/products", routes::products::router::<S>())
        .nest("/models", routes::models::router::<S>())
        .nest("/stocks", routes::stocks::router::<S>())
        .nest("/images", routes::images::router::<S>())
        .nest("/orders", routes::orders::router::<S>())
        .nest("/reports", routes::reports::router::<S>())
        .nest("/payments", routes::payments::router::<S>());

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", v1)
        .fallback(not_found)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
