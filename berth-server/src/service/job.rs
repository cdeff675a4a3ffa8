//! Job Service
//!
//! Business logic behind the job endpoints. Every call opens its own job
//! store connection and closes it before returning.

use berth_core::domain::deployment::{DeploymentRequest, PayloadError};
use berth_core::domain::job::{DEPLOYMENT_JOB_TYPE, Job, NewJob};
use berth_core::domain::message::Message;
use berth_worker::{JobConnection, JobStore, MessageSender, StoreError};
use uuid::Uuid;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    ValidationError(String),
    QueueClosed(i64),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::StoreError(err)
    }
}

impl From<PayloadError> for JobError {
    fn from(err: PayloadError) -> Self {
        JobError::ValidationError(err.to_string())
    }
}

/// Get a job by its client-visible uuid
pub async fn get_job(store: &dyn JobStore, uuid: Uuid) -> Result<Job, JobError> {
    let mut conn = store.connect().await?;
    let result = find(conn.as_mut(), uuid).await;
    conn.close().await;

    result
}

/// Delete a job by its client-visible uuid
pub async fn delete_job(store: &dyn JobStore, uuid: Uuid) -> Result<(), JobError> {
    let mut conn = store.connect().await?;
    let result = remove(conn.as_mut(), uuid).await;
    conn.close().await;

    result
}

/// Create a deployment job from a raw request body and enqueue it
///
/// The job stays `queued` in the store when the queue has already closed.
pub async fn submit_deployment(
    store: &dyn JobStore,
    queue: &MessageSender,
    body: &str,
) -> Result<Job, JobError> {
    let request = DeploymentRequest::decode(body)?;

    let mut conn = store.connect().await?;
    let result = conn
        .create(NewJob::new(DEPLOYMENT_JOB_TYPE, request.to_payload()?))
        .await;
    conn.close().await;
    let job = result?;

    let message = Message::new(job.id);
    let raw = message
        .encode()
        .map_err(|e| JobError::ValidationError(e.to_string()))?;

    queue
        .send(raw)
        .await
        .map_err(|_| JobError::QueueClosed(job.id))?;

    tracing::info!(
        job_id = job.id,
        job_uuid = %job.uuid,
        correlation_id = %message.uuid,
        cluster = %request.cluster,
        "Deployment job queued"
    );

    Ok(job)
}

async fn find(conn: &mut dyn JobConnection, uuid: Uuid) -> Result<Job, JobError> {
    conn.get_by_uuid(uuid)
        .await?
        .ok_or(JobError::NotFound(uuid))
}

async fn remove(conn: &mut dyn JobConnection, uuid: Uuid) -> Result<(), JobError> {
    let job = find(&mut *conn, uuid).await?;

    match conn.delete(job.id).await {
        Ok(()) => Ok(()),
        // removed by someone else in between
        Err(StoreError::NotFound(_)) => Err(JobError::NotFound(uuid)),
        Err(e) => Err(e.into()),
    }
}
