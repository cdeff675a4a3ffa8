//! Scheduler layer
//!
//! This layer owns the inbound message queue and the pool of workers that
//! drain it. It handles worker lifecycle and store connections; everything
//! that decides a job's fate lives in the service layer.

pub mod pool;
pub mod queue;

pub use pool::WorkerPool;
pub use queue::{MessageQueue, MessageSender, QueueClosed, channel};
