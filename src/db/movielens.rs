//! Bulk loading of the MovieLens CSV exports into PostgreSQL.

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::{io::Read, path::Path};

use crate::error::{AppError, AppResult};

/// Row of `ratings.csv`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RatingRecord {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub rating: f64,
    pub timestamp: Option<i64>,
}

/// Row of `movies.csv`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MovieRecord {
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub title: String,
    pub genres: Option<String>,
}

/// Row of `tags.csv`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub tag: String,
    pub timestamp: Option<i64>,
}

/// A CSV table that can be appended to its PostgreSQL counterpart
pub trait CsvTable: serde::de::DeserializeOwned + Send {
    const TABLE: &'static str;

    fn insert_batch(builder: &mut QueryBuilder<'_, Postgres>, batch: Vec<Self>);
}

impl CsvTable for RatingRecord {
    const TABLE: &'static str = "ml_ratings";

    fn insert_batch(builder: &mut QueryBuilder<'_, Postgres>, batch: Vec<Self>) {
        builder.push("INSERT INTO ml_ratings (user_id, movie_id, rating, rated_at) ");
        builder.push_values(batch, |mut row, r| {
            row.push_bind(r.user_id)
                .push_bind(r.movie_id)
                .push_bind(r.rating)
                .push_bind(r.timestamp);
        });
    }
}

impl CsvTable for MovieRecord {
    const TABLE: &'static str = "ml_movies";

    fn insert_batch(builder: &mut QueryBuilder<'_, Postgres>, batch: Vec<Self>) {
        builder.push("INSERT INTO ml_movies (movie_id, title, genres) ");
        builder.push_values(batch, |mut row, m| {
            row.push_bind(m.movie_id).push_bind(m.title).push_bind(m.genres);
        });
        builder.push(" ON CONFLICT (movie_id) DO NOTHING");
    }
}

impl CsvTable for TagRecord {
    const TABLE: &'static str = "ml_tags";

    fn insert_batch(builder: &mut QueryBuilder<'_, Postgres>, batch: Vec<Self>) {
        builder.push("INSERT INTO ml_tags (user_id, movie_id, tag, tagged_at) ");
        builder.push_values(batch, |mut row, t| {
            row.push_bind(t.user_id)
                .push_bind(t.movie_id)
                .push_bind(t.tag)
                .push_bind(t.timestamp);
        });
    }
}

/// Typed records of a CSV stream with a header row, in file order
pub fn records<'a, T: CsvTable + 'a, R: Read>(
    reader: &'a mut csv::Reader<R>,
) -> impl Iterator<Item = AppResult<T>> + 'a {
    reader.deserialize::<T>().map(|record| {
        record.map_err(|e| AppError::Data(format!("Malformed {} record: {}", T::TABLE, e)))
    })
}

/// Appends a CSV file to its table, one transaction per batch
///
/// Rows keep file order, which is the recency order the recommender relies on.
/// Returns the number of inserted rows.
pub async fn load_csv<T: CsvTable>(pool: &PgPool, path: &Path, batch_size: usize) -> AppResult<usize> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::ResourceNotFound(format!("{}: {}", path.display(), e)))?;

    let mut loaded = 0;
    let mut batch: Vec<T> = Vec::with_capacity(batch_size);
    for record in records::<T, _>(&mut reader) {
        batch.push(record?);

        if batch.len() >= batch_size {
            loaded += insert(pool, std::mem::take(&mut batch)).await?;
            tracing::debug!(table = T::TABLE, loaded, "Batch inserted");
        }
    }
    if !batch.is_empty() {
        loaded += insert(pool, batch).await?;
    }

    tracing::info!(table = T::TABLE, rows = loaded, path = %path.display(), "CSV loaded");

    Ok(loaded)
}

async fn insert<T: CsvTable>(pool: &PgPool, batch: Vec<T>) -> AppResult<usize> {
    let rows = batch.len();
    let mut tx = pool.begin().await?;
    let mut builder = QueryBuilder::new("");
    T::insert_batch(&mut builder, batch);
    builder.build().execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(rows)
}
