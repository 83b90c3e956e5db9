use anyhow::Context;
use conduit_orchestrator::App;
use conduit_orchestrator::config::Config;
use conduit_orchestrator::db;
use conduit_orchestrator::provider::RemoteProvider;
use conduit_orchestrator::scm::GitCli;
use conduit_orchestrator::store::{MemoryObjectStore, ObjectStore, PgObjectStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conduit Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let store: Arc<dyn ObjectStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(url, config.db_max_connections)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database connection pool created");
            Arc::new(PgObjectStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            Arc::new(MemoryObjectStore::new())
        }
    };

    tracing::info!("Using build executor at {}", config.executor_url);
    let provider = Arc::new(RemoteProvider::new(config.executor_url.clone()));

    let app = App::start(store, provider, Arc::new(GitCli::new()), config.subscriber_buffer)
        .await
        .context("Failed to start orchestrator")?;
    let router = app.router();

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("Server error")?;

    tracing::info!("Shutting down...");
    app.shutdown().await;
    Ok(())
}
