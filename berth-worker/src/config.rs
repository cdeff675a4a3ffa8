//! Worker pool configuration
//!
//! Defines the size of the pool, the bound applied to every collaborator
//! call made by the deployment pipeline, and the capacity of the inbound
//! message queue.

use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers draining the queue
    pub workers: usize,

    /// Upper bound for a single job store or cluster call
    pub stage_timeout: Duration,

    /// Number of messages the queue buffers before producers wait
    pub queue_capacity: usize,
}

impl WorkerConfig {
    /// Creates a new configuration with defaults
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            stage_timeout: Duration::from_secs(30),
            queue_capacity: 100,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WORKER_COUNT (optional, default: 4)
    /// - WORKER_STAGE_TIMEOUT (optional, seconds, default: 30)
    /// - WORKER_QUEUE_CAPACITY (optional, default: 100)
    pub fn from_env() -> anyhow::Result<Self> {
        let workers = parse_env("WORKER_COUNT")?.unwrap_or(4);

        let stage_timeout = parse_env("WORKER_STAGE_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let queue_capacity = parse_env("WORKER_QUEUE_CAPACITY")?.unwrap_or(100);

        Ok(Self {
            workers,
            stage_timeout,
            queue_capacity,
        })
    }

    /// Sets the per-call timeout
    pub fn with_stage_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("worker count must be greater than 0");
        }

        if self.stage_timeout.is_zero() {
            anyhow::bail!("stage timeout must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue capacity must be greater than 0");
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Reads an optional numeric variable; a set but unparsable value is an error
fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", name, value)),
        Err(_) => Ok(None),
    }
}
