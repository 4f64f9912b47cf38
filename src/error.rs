use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// A resource the process needs to serve (model snapshot, database) is unavailable
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The ratings store failed while answering a request
    #[error("Query failure: {0}")]
    QueryFailure(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Training data cannot produce a usable model
    #[error("Data error: {0}")]
    Data(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Data(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::ResourceNotFound(_) | AppError::QueryFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Cache(_) | AppError::Snapshot(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
