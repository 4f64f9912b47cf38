//! Loads the MovieLens CSV exports into PostgreSQL.
//!
//! Expects `ratings.csv` and `movies.csv` in the data directory; `tags.csv`
//! is loaded when present. Missing files are skipped with a warning.
//!
//! ```bash
//! load-data --data-dir data
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use recofilm_api::{
    config::Config,
    db::{
        create_pool,
        movielens::{load_csv, CsvTable, MovieRecord, RatingRecord, TagRecord},
        run_migrations,
    },
};
use sqlx::PgPool;

/// Load MovieLens data into the ratings database
#[derive(Parser, Debug)]
#[command(name = "load-data", version, about = "Load MovieLens CSV files into PostgreSQL")]
struct LoadArgs {
    /// Directory holding ratings.csv, movies.csv and tags.csv
    #[arg(long, value_name = "DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Rows per insert transaction
    #[arg(long, default_value_t = 10_000)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = LoadArgs::parse();
    anyhow::ensure!(args.batch_size > 0, "--batch-size must be positive");
    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to the ratings database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    load_if_present::<RatingRecord>(&pool, &args.data_dir.join("ratings.csv"), args.batch_size).await?;
    load_if_present::<MovieRecord>(&pool, &args.data_dir.join("movies.csv"), args.batch_size).await?;
    load_if_present::<TagRecord>(&pool, &args.data_dir.join("tags.csv"), args.batch_size).await?;

    sqlx::query("ANALYZE").execute(&pool).await?;
    tracing::info!(data_dir = %args.data_dir.display(), "Data load finished");

    Ok(())
}

async fn load_if_present<T: CsvTable>(pool: &PgPool, path: &Path, batch_size: usize) -> anyhow::Result<()> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Skipping missing file");
        return Ok(());
    }

    load_csv::<T>(pool, path, batch_size)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;

    Ok(())
}
