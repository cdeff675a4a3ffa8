//! Job Repository
//!
//! PostgreSQL implementation of the worker job store. Each
//! [`JobConnection`] pins one pooled connection until it is closed.

use async_trait::async_trait;
use berth_core::domain::job::{Job, JobStatus, NewJob};
use berth_worker::{JobConnection, JobStore, StoreError};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

const JOB_COLUMNS: &str =
    "id, uuid, type, payload, status, result, run_at, created_at, updated_at";

/// Job store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn connect(&self) -> Result<Box<dyn JobConnection>, StoreError> {
        let conn = self.pool.acquire().await.map_err(store_error)?;
        Ok(Box::new(PgJobConnection { conn: Some(conn) }))
    }
}

struct PgJobConnection {
    conn: Option<PoolConnection<Postgres>>,
}

impl PgJobConnection {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn
            .as_mut()
            .map(|conn| &mut **conn)
            .ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl JobConnection for PgJobConnection {
    async fn create(&mut self, job: NewJob) -> Result<Job, StoreError> {
        let now = chrono::Utc::now();

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO jobs (uuid, type, payload, status, result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, '', $5, $5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(JobStatus::Queued.as_str())
        .bind(now)
        .fetch_one(self.conn()?)
        .await
        .map_err(store_error)?;

        row.try_into()
    }

    async fn get_by_id(&mut self, id: i64) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;

        row.map(Job::try_from).transpose()
    }

    async fn get_by_uuid(&mut self, uuid: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;

        row.map(Job::try_from).transpose()
    }

    async fn update(&mut self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET type = $1, payload = $2, status = $3, result = $4, run_at = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(&job.result)
        .bind(job.run_at)
        .bind(chrono::Utc::now())
        .bind(job.id)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job.id.to_string()));
        }

        Ok(())
    }

    async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn close(&mut self) {
        // dropping returns the connection to the pool
        self.conn.take();
    }
}

/// Maps sqlx errors into store errors
fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool is closed".to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::backend(other),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    uuid: Uuid,
    #[sqlx(rename = "type")]
    job_type: String,
    payload: String,
    status: String,
    result: String,
    run_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(format!("job {}: {}", row.id, e)))?;

        Ok(Job {
            id: row.id,
            uuid: row.uuid,
            job_type: row.job_type,
            status,
            payload: row.payload,
            result: row.result,
            run_at: row.run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
