use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::request_id::RequestId;
use crate::models::UserId;
use crate::services::recommendations::DEFAULT_TOP_K;
use crate::services::training::TrainingSummary;

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub user_id: UserId,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub user_id: UserId,
    pub top_k: i64,
    pub titles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: Option<String>,
    pub trained_at: DateTime<Utc>,
    pub items: usize,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.model.current();

    Json(HealthResponse {
        status: "ok",
        model: state.model_path.as_ref().map(|p| p.display().to_string()),
        trained_at: snapshot.trained_at,
        items: snapshot.items.len(),
    })
}

/// Recommend movie titles for a user
pub async fn predict(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<PredictRequest>,
) -> AppResult<Json<PredictResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = request.user_id,
        top_k = request.top_k,
        "Processing prediction request"
    );

    let titles = state.engine.recommend(request.user_id, request.top_k).await?;

    tracing::info!(
        request_id = %request_id,
        returned = titles.len(),
        "Prediction completed"
    );

    Ok(Json(PredictResponse {
        user_id: request.user_id,
        top_k: request.top_k,
        titles,
    }))
}

/// Retrain the model from the ratings store and publish it
pub async fn training(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<TrainingSummary>> {
    tracing::info!(request_id = %request_id, "Processing training request");

    let summary = state.trainer.retrain().await?;
    Ok(Json(summary))
}
