use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use recofilm_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache},
    services::{ModelHandle, ModelSnapshot},
    store::PgRatingsStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // The process does not serve without a model and a database
    let snapshot = ModelSnapshot::load(&config.model_path)
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;
    let pool = create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to the ratings database")?;

    let mut store = PgRatingsStore::new(pool);
    let mut cache_writer = None;
    if let Some(redis_url) = &config.redis_url {
        let client = create_redis_client(redis_url).context("Invalid Redis URL")?;
        let (cache, handle) = Cache::new(client).await;
        store = store.with_title_cache(cache, config.title_cache_ttl_secs);
        cache_writer = Some(handle);
    }

    let state = AppState::new(
        Arc::new(store),
        ModelHandle::new(snapshot),
        Some(config.model_path.clone()),
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(host = %config.host, port = config.port, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
