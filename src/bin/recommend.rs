//! One-shot recommendations from the command line.
//!
//! ```bash
//! recommend --user-id 42 --top-k 5
//! ```

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use recofilm_api::{
    config::Config,
    db::create_pool,
    services::{recommendations::DEFAULT_TOP_K, ModelHandle, ModelSnapshot, RecommendationEngine},
    store::PgRatingsStore,
};

/// Recommend movies for one user
#[derive(Parser, Debug)]
#[command(name = "recommend", version, about = "Print movie recommendations for a user")]
struct RecommendArgs {
    /// User to recommend for
    #[arg(long)]
    user_id: i64,

    /// Number of titles to return
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = RecommendArgs::parse();
    let config = Config::from_env()?;

    let snapshot = ModelSnapshot::load(&config.model_path)
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;
    let pool = create_pool(&config.database_url, 1)
        .await
        .context("Failed to connect to the ratings database")?;

    let engine = RecommendationEngine::new(
        Arc::new(PgRatingsStore::new(pool)),
        ModelHandle::new(snapshot),
    );
    let titles = engine.recommend(args.user_id, args.top_k).await?;

    println!(
        "{}",
        json!({ "user_id": args.user_id, "recommendations": titles })
    );

    Ok(())
}
