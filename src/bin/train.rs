//! Offline training job.
//!
//! Reads every rating from the database, trains a fresh model snapshot and
//! writes it to the configured model path.
//!
//! ```bash
//! train --model-path models/knncf.json
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recofilm_api::{
    config::Config,
    db::create_pool,
    services::train_model,
    store::{PgRatingsStore, RatingsStore},
};

/// Train the KNN collaborative filtering model
#[derive(Parser, Debug)]
#[command(name = "train", version, about = "Train the item-based KNN model from all ratings")]
struct TrainArgs {
    /// Output path for the snapshot (defaults to MODEL_PATH)
    #[arg(long, value_name = "PATH")]
    model_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = TrainArgs::parse();
    let config = Config::from_env()?;
    let model_path = args.model_path.unwrap_or(config.model_path);

    let pool = create_pool(&config.database_url, 1)
        .await
        .context("Failed to connect to the ratings database")?;
    let store = PgRatingsStore::new(pool);

    let ratings = store.all_ratings().await.context("Failed to read ratings")?;
    let snapshot = train_model(&ratings).context("Training failed")?;
    snapshot
        .save(&model_path)
        .with_context(|| format!("Failed to save model to {}", model_path.display()))?;

    tracing::info!(path = %model_path.display(), "Saved KNN-CF model");

    Ok(())
}
