use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{ModelHandle, RecommendationEngine, Trainer};
use crate::store::RatingsStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub trainer: Arc<Trainer>,
    pub model: ModelHandle,
    /// Where the served snapshot lives on disk, if anywhere
    pub model_path: Option<PathBuf>,
}

impl AppState {
    /// Wires the engine and trainer around one store and one published model
    pub fn new(
        store: Arc<dyn RatingsStore>,
        model: ModelHandle,
        model_path: Option<PathBuf>,
    ) -> Self {
        let engine = RecommendationEngine::new(store.clone(), model.clone());
        let trainer = Trainer::new(store, model.clone(), model_path.clone());

        Self {
            engine: Arc::new(engine),
            trainer: Arc::new(trainer),
            model,
            model_path,
        }
    }
}
