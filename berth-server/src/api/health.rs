//! Health Check API Handler

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Liveness of the HTTP surface; does not touch the job store
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
