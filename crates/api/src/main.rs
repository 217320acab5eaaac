//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{Backends, create_app, create_state};
use inventory::{InventoryService, STOCK_UPDATES_TOPIC, StockUpdateConsumer};
use saga::Reconciler;
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
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Storage: PostgreSQL when configured, otherwise in memory
    let backends = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            tracing::info!("using PostgreSQL storage");
            Backends::postgres(pool)
                .await
                .expect("failed to run migrations")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Backends::in_memory()
        }
    };

    // 4. Saga and application state
    let inventory_client = backends.inventory_client(config.inventory_base_url.as_deref());
    let state = create_state(&backends, Arc::clone(&inventory_client), config.saga_options());

    // 5. Background tasks: stock update consumer and pending order reconciler
    let consumer = match &config.inventory_base_url {
        Some(url) => {
            tracing::info!(%url, "using remote inventory service");
            None
        }
        None => {
            let handler = Arc::new(StockUpdateConsumer::new(InventoryService::new(Arc::clone(
                &backends.products,
            ))));
            Some(messaging::consume(
                Arc::clone(&backends.channel),
                STOCK_UPDATES_TOPIC,
                handler,
                config.consumer_options(),
            ))
        }
    };
    let reconciler = Reconciler::new(
        Arc::clone(&backends.orders),
        inventory_client,
        config.reconciler_options(),
    )
    .spawn();

    // 6. Start server
    let app = create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop background tasks
    if let Some(consumer) = consumer {
        consumer.shutdown().await;
    }
    reconciler.shutdown().await;

    tracing::info!("server shut down gracefully");
}
