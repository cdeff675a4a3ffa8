//! Job store contract

use async_trait::async_trait;
use berth_core::domain::job::{Job, NewJob};
use uuid::Uuid;

/// Source of job store connections
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Opens a connection private to the caller
    async fn connect(&self) -> Result<Box<dyn JobConnection>, StoreError>;
}

/// A single connection to the job store
///
/// Every method may fail with a connection-level [`StoreError`]; callers
/// should close the connection and open a new one when
/// [`StoreError::is_connection_fault`] says so.
#[async_trait]
pub trait JobConnection: Send + Sync {
    /// Creates a queued job; the store assigns id, uuid and timestamps
    async fn create(&mut self, job: NewJob) -> Result<Job, StoreError>;

    /// Finds a job by its internal id
    async fn get_by_id(&mut self, id: i64) -> Result<Option<Job>, StoreError>;

    /// Finds a job by its client-visible uuid
    async fn get_by_uuid(&mut self, uuid: Uuid) -> Result<Option<Job>, StoreError>;

    /// Overwrites the whole record identified by `job.id`
    ///
    /// There is no conditional update: concurrent writers to the same job
    /// race and the last write wins.
    async fn update(&mut self, job: &Job) -> Result<(), StoreError>;

    /// Deletes a job by its internal id
    async fn delete(&mut self, id: i64) -> Result<(), StoreError>;

    /// Releases the connection
    ///
    /// Safe to call more than once and after any earlier error. Every other
    /// method fails with [`StoreError::Closed`] afterwards.
    async fn close(&mut self);
}

/// Errors returned by job store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    /// The connection was already closed
    #[error("job store connection is closed")]
    Closed,

    /// The call did not finish in time
    #[error("job store call timed out")]
    Timeout,

    /// No job with this identifier exists
    #[error("job {0} not found")]
    NotFound(String),

    /// A stored record could not be mapped back into a job
    #[error("corrupt job record: {0}")]
    Corrupt(String),

    /// Error raised by the storage backend
    #[error("job store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a backend-specific error
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }

    /// Whether the connection that produced this error should be discarded
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Closed | Self::Timeout | Self::Backend(_)
        )
    }
}
