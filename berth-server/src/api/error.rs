//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use berth_worker::StoreError;

use crate::service::job_service::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    StoreError(StoreError),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::StoreError(err) => {
                tracing::error!(error = %err, "Job store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreError(err)
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(uuid) => ApiError::NotFound(format!("Job {} not found", uuid)),
            JobError::ValidationError(msg) => ApiError::BadRequest(msg),
            JobError::QueueClosed(id) => {
                ApiError::Unavailable(format!("Job {} created but the queue is closed", id))
            }
            JobError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
