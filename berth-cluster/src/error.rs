//! Error types for the cluster client

use thiserror::Error;

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur when talking to a cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No cluster is registered under this name
    #[error("cluster not found: {0}")]
    NotFound(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The cluster agent returned an error status code
    #[error("cluster API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the agent
        message: String,
    },

    /// Failed to parse the agent response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The call did not finish before its deadline
    #[error("cluster call timed out")]
    Timeout,
}

impl ClusterError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the call ran out of time, either locally or inside reqwest
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::RequestFailed(e) => e.is_timeout(),
            _ => false,
        }
    }
}
