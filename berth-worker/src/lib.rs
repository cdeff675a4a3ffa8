//! Berth Worker
//!
//! Runs deployment jobs taken from an in-process message queue.
//!
//! Architecture:
//! - Configuration: pool size, per-call timeout and queue capacity
//! - Repository: job store abstraction plus an in-memory implementation
//! - Service: the deployment pipeline taking one job to a terminal status
//! - Scheduler: the shared queue and the pool of workers draining it
//!
//! The embedding process owns the sending side of the queue. Dropping every
//! sender closes the queue; workers finish what is buffered and exit.

pub mod config;
pub mod context;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use repository::{JobConnection, JobStore, MemoryJobStore, StoreError};
pub use scheduler::{MessageQueue, MessageSender, QueueClosed, WorkerPool, channel};
pub use service::{DeploymentPipeline, JobFailure, Outcome, SUCCESS_RESULT, StageFault};
