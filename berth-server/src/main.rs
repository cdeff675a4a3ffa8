use anyhow::{Context, Result};
use berth_cluster::HttpClusterRegistry;
use berth_server::api::{self, AppState};
use berth_server::config::{Config, StoreKind};
use berth_server::db;
use berth_server::repository::PgJobStore;
use berth_worker::{DeploymentPipeline, JobStore, MemoryJobStore, WorkerPool, channel};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "berth_server=info,berth_worker=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Berth Server...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let store = build_store(&config).await?;

    // Build cluster registry
    let client = reqwest::Client::builder()
        .timeout(config.cluster_request_timeout)
        .build()
        .context("Failed to build cluster HTTP client")?;
    let clusters = HttpClusterRegistry::new(config.clusters.clone(), client);
    tracing::info!(clusters = ?clusters.names(), "Cluster registry ready");

    // Start workers
    let (queue_tx, queue_rx) = channel(config.worker.queue_capacity);
    let pipeline = Arc::new(DeploymentPipeline::new(
        Arc::new(clusters),
        config.worker.stage_timeout,
    ));
    let pool = WorkerPool::spawn(&config.worker, Arc::clone(&store), pipeline, queue_rx);

    // Build router with all API endpoints
    let app = api::create_router(AppState::new(store, queue_tx));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    // The router owns the last queue sender; once the server returns it is
    // dropped and the workers drain what is left.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("HTTP server stopped, waiting for workers");
    pool.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn build_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    match config.store {
        StoreKind::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url, config.database_max_connections)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok(Arc::new(PgJobStore::new(pool)))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory job store, jobs are lost on exit");
            Ok(Arc::new(MemoryJobStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received");
}
