use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc, time::Instant};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{Rating, LIKED_THRESHOLD},
    services::{
        matrix::build_interactions,
        neighbors::{NeighborIndex, DEFAULT_NEIGHBORS},
        popularity::{rank_by_popularity, POPULARITY_LIMIT},
        snapshot::{ModelHandle, ModelSnapshot, SNAPSHOT_FORMAT_VERSION},
    },
    store::RatingsStore,
};

/// Trains a complete model snapshot from scratch
///
/// Builds the liked interaction matrix, fits the neighbor index over its
/// item columns and ranks the popularity fallback over every rating.
/// Fails with [`AppError::Data`] when no rating is liked.
pub fn train_model(ratings: &[Rating]) -> AppResult<ModelSnapshot> {
    let start = Instant::now();

    let interactions = build_interactions(ratings)?;
    let (n_users, n_items) = interactions.shape();

    let neighbors = NeighborIndex::fit(&interactions.matrix, DEFAULT_NEIGHBORS);
    let popularity = rank_by_popularity(ratings, POPULARITY_LIMIT);

    tracing::info!(
        ratings = ratings.len(),
        users = n_users,
        items = n_items,
        nnz = interactions.nnz(),
        popularity = popularity.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "Model trained"
    );

    Ok(ModelSnapshot {
        version: SNAPSHOT_FORMAT_VERSION,
        trained_at: Utc::now(),
        liked_threshold: LIKED_THRESHOLD,
        neighbors,
        users: interactions.users,
        items: interactions.items,
        popularity,
    })
}

/// Outcome of a retrain, reported to callers of the training endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub status: &'static str,
    pub users: usize,
    pub items: usize,
    pub popularity: usize,
    pub trained_at: DateTime<Utc>,
}

impl From<&ModelSnapshot> for TrainingSummary {
    fn from(snapshot: &ModelSnapshot) -> Self {
        Self {
            status: "trained",
            users: snapshot.users.len(),
            items: snapshot.items.len(),
            popularity: snapshot.popularity.len(),
            trained_at: snapshot.trained_at,
        }
    }
}

/// Retrains in-process and republishes the result
///
/// Retrains run one at a time; a second request waits for the first to
/// finish and then trains again on fresh ratings.
pub struct Trainer {
    store: Arc<dyn RatingsStore>,
    model: ModelHandle,
    model_path: Option<PathBuf>,
    running: Mutex<()>,
}

impl Trainer {
    /// `model_path` is where each new snapshot is persisted; `None` keeps it in memory only
    pub fn new(store: Arc<dyn RatingsStore>, model: ModelHandle, model_path: Option<PathBuf>) -> Self {
        Self {
            store,
            model,
            model_path,
            running: Mutex::new(()),
        }
    }

    pub async fn retrain(&self) -> AppResult<TrainingSummary> {
        let _guard = self.running.lock().await;
        tracing::info!("Retrain started");

        let ratings = self.store.all_ratings().await?;
        let model_path = self.model_path.clone();

        // Training and the file write are blocking work
        let snapshot = tokio::task::spawn_blocking(move || -> AppResult<ModelSnapshot> {
            let snapshot = train_model(&ratings)?;
            if let Some(path) = model_path {
                snapshot.save(&path)?;
            }
            Ok(snapshot)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        let summary = TrainingSummary::from(&snapshot);
        self.model.publish(snapshot);

        tracing::info!(
            users = summary.users,
            items = summary.items,
            trained_at = %summary.trained_at,
            "Retrained model published"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::InMemoryRatingsStore, MockRatingsStore};

    fn ratings() -> Vec<Rating> {
        vec![
            Rating::new(1, 10, 4.0),
            Rating::new(1, 20, 5.0),
            Rating::new(2, 10, 4.5),
            Rating::new(2, 30, 1.0),
            Rating::new(3, 30, 2.0),
        ]
    }

    #[test]
    fn test_train_model_assembles_snapshot() {
        let snapshot = train_model(&ratings()).unwrap();

        assert_eq!(snapshot.version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.users.ids(), &[1, 2]);
        assert_eq!(snapshot.items.ids(), &[10, 20]);
        assert_eq!(snapshot.neighbors.n_items(), 2);
        assert_eq!(snapshot.neighbors.n_neighbors(), DEFAULT_NEIGHBORS);
        // Movie 30 is never liked but is rated twice
        assert_eq!(snapshot.popularity, vec![10, 30, 20]);
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_train_model_without_likes_fails() {
        let ratings = vec![Rating::new(1, 10, 1.0)];
        assert!(matches!(train_model(&ratings), Err(AppError::Data(_))));
    }

    #[tokio::test]
    async fn test_retrain_publishes_and_persists() {
        let initial = train_model(&[Rating::new(9, 99, 5.0)]).unwrap();
        let handle = ModelHandle::new(initial);
        let held = handle.current();

        let store = InMemoryRatingsStore::new(ratings(), vec![]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knncf.json");
        let trainer = Trainer::new(Arc::new(store), handle.clone(), Some(path.clone()));

        let summary = trainer.retrain().await.unwrap();

        assert_eq!(summary.status, "trained");
        assert_eq!(summary.items, 2);
        assert_eq!(handle.current().items.ids(), &[10, 20]);
        assert_eq!(held.items.ids(), &[99]);
        assert_eq!(ModelSnapshot::load(&path).unwrap().items.ids(), &[10, 20]);
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_current_model() {
        let initial = train_model(&ratings()).unwrap();
        let handle = ModelHandle::new(initial.clone());

        let mut store = MockRatingsStore::new();
        store
            .expect_all_ratings()
            .returning(|| Err(AppError::QueryFailure(sqlx::Error::PoolTimedOut)));
        let trainer = Trainer::new(Arc::new(store), handle.clone(), None);

        let result = trainer.retrain().await;

        assert!(matches!(result, Err(AppError::QueryFailure(_))));
        assert_eq!(*handle.current(), initial);
    }
}
