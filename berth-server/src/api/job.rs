//! Job API Handlers
//!
//! HTTP endpoints for submitting, querying and deleting jobs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use berth_core::dto::job::JobView;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::job_service;

/// POST /deployment
/// Create a deployment job and queue it for the workers
pub async fn submit_deployment(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let job = job_service::submit_deployment(state.store.as_ref(), &state.queue, &body).await?;

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// GET /job/{uuid}
/// Get job details by uuid
pub async fn get_job(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<JobView>> {
    let uuid = parse_uuid(&uuid)?;
    tracing::debug!("Getting job: {}", uuid);

    let job = job_service::get_job(state.store.as_ref(), uuid).await?;

    Ok(Json(job.into()))
}

/// DELETE /job/{uuid}
/// Delete a job by uuid
pub async fn delete_job(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> ApiResult<StatusCode> {
    let uuid = parse_uuid(&uuid)?;
    tracing::info!("Deleting job: {}", uuid);

    job_service::delete_job(state.store.as_ref(), uuid).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// A path segment that is not a uuid cannot name an existing job
fn parse_uuid(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Job {} not found", raw)))
}
