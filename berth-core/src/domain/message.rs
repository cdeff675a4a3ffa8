//! Inbound queue message
//!
//! A message is the unit delivered through the worker queue. It only carries
//! a correlation id for tracing the delivery and the internal id of the job
//! it refers to; everything else lives in the job record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single queue delivery referring to one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// Correlation id for this delivery, independent of the job's uuid
    pub uuid: String,
    /// Internal job id
    pub job: i64,
}

impl Message {
    /// Creates a message for a job with a fresh correlation id
    pub fn new(job: i64) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            job,
        }
    }

    /// Decodes a message from its compact JSON form
    pub fn decode(raw: &str) -> Result<Self, MessageDecodeError> {
        let message: Message = serde_json::from_str(raw)?;

        if message.uuid.trim().is_empty() {
            return Err(MessageDecodeError::MissingCorrelationId);
        }

        if message.job < 1 {
            return Err(MessageDecodeError::InvalidJobId(message.job));
        }

        Ok(message)
    }

    /// Encodes the message into its compact JSON form
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageDecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has an empty correlation id")]
    MissingCorrelationId,

    #[error("message refers to invalid job id {0}")]
    InvalidJobId(i64),
}
