//! API server entry point.

use std::sync::Arc;

use api::Services;
use api::config::{Config, LogFormat};
use item_store::{InMemoryItemStore, ItemStore, PostgresItemStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Selects the item store: Postgres when `DATABASE_URL` is set, memory otherwise.
async fn open_store(config: &Config) -> Result<(Arc<dyn ItemStore>, &'static str), Box<dyn std::error::Error>> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using the in-memory item store");
        return Ok((Arc::new(InMemoryItemStore::new(domain::table_schema())), "memory"));
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PostgresItemStore::new(pool, &config.items_table, domain::table_schema());
    store.run_migrations().await?;
    tracing::info!(table = %config.items_table, "connected to the Postgres item store");
    Ok((Arc::new(store), "postgres"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Wire collaborators, use cases and adapters
    let (store, backend) = open_store(&config).await?;
    if config.auth_tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS is empty, every authenticated route will answer 401");
    }
    let services = Services::in_memory(&config, store, backend);
    let (state, worker) = api::create_state(&config, services);

    // 4. Start the queue worker
    let (stop_worker, worker_shutdown) = watch::channel(false);
    let worker_task = tokio::spawn(worker.run(worker_shutdown));

    // 5. Serve until a shutdown signal arrives
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Stop the worker after in-flight requests have drained
    let _ = stop_worker.send(true);
    if let Err(err) = worker_task.await {
        tracing::error!(error = %err, "queue worker terminated abnormally");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
