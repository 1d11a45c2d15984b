//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::auth::TokenService;
use api::config::{Config, LogFormat};
use domain::services::{
    CloudinaryStorage, ImageStorage, InMemoryImageStorage, LogMailer, Mailer, SmtpMailer,
};
use reconciliation::Reconciler;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_mailer(config: &Config) -> Result<Arc<dyn Mailer>, Box<dyn std::error::Error>> {
    Ok(match &config.smtp {
        Some(settings) => {
            tracing::info!(host = %settings.host, "sending email through SMTP");
            Arc::new(SmtpMailer::new(settings)?)
        }
        None => {
            tracing::warn!("SMTP not configured, emails will only be logged");
            Arc::new(LogMailer)
        }
    })
}

fn build_image_storage(config: &Config) -> Arc<dyn ImageStorage> {
    match &config.cloudinary {
        Some(settings) => Arc::new(CloudinaryStorage::new(settings.clone())),
        None => {
            tracing::warn!("Cloudinary not configured, images are kept in memory");
            Arc::new(InMemoryImageStorage::new())
        }
    }
}

/// Wires the services over `store`, starts reconciliation and serves HTTP
/// until a shutdown signal arrives.
async fn serve<S: Store + Clone + 'static>(
    store: S,
    config: Config,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = TokenService::new(config.token_secret(), config.token_expires);
    let state = Arc::new(AppState::new(
        store,
        build_mailer(&config)?,
        build_image_storage(&config),
        tokens,
        config.payment_webhook_secret.clone(),
    ));

    let reconciler = Reconciler::new(state.orders.clone(), config.reconcile);
    let reconcile_task = reconciliation::spawn(reconciler, config.reconcile_at);
    tracing::info!(at = %config.reconcile_at, "stale order reconciliation scheduled");

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconcile_task.abort();
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration (.env is optional)
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 4. Pick the store and run
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url.expose_secret())
                .await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");
            serve(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryStore::new(), config, metrics_handle).await
        }
    }
}
