//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job type assigned to jobs created by the deployment submission endpoint
pub const DEPLOYMENT_JOB_TYPE: &str = "deployment";

/// Persisted unit of deployment work
///
/// Structure shared between the server (persists, exposes) and the worker
/// pool (drives it to a terminal status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned sequential identifier
    pub id: i64,
    /// Client-visible identifier, assigned at creation
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    /// Serialized deployment request, never rewritten after creation
    pub payload: String,
    /// Human-readable outcome, empty until the job reaches a terminal status
    pub result: String,
    /// Time of the last terminal transition
    pub run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Applies a terminal transition.
    ///
    /// Re-completing a job that is already terminal is allowed: a redelivered
    /// message runs the pipeline again and the last write wins.
    pub fn complete(
        &mut self,
        status: JobStatus,
        result: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if !status.is_terminal() {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        self.result = result.into();
        self.run_at = Some(at);

        Ok(())
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Success,
    Failed,
}

impl JobStatus {
    /// Terminal statuses are absorbing for a single pipeline run
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::UnknownStatus(other.to_string())),
        }
    }
}

/// Input for creating a job; the store assigns everything else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub job_type: String,
    pub payload: String,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            payload: payload.into(),
        }
    }

    /// Materializes the job record for a freshly assigned id.
    ///
    /// Stores that generate ids themselves (e.g. a database sequence) only
    /// use this for the uuid and timestamps.
    pub fn into_job(self, id: i64, now: DateTime<Utc>) -> Job {
        Job {
            id,
            uuid: Uuid::new_v4(),
            job_type: self.job_type,
            status: JobStatus::Queued,
            payload: self.payload,
            result: String::new(),
            run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("unknown job status: {0}")]
    UnknownStatus(String),
}
