//! Per-worker context
//!
//! Every worker owns one context and passes it into each pipeline call. It is
//! the only place worker identity lives; correlation ids come from the
//! message being processed and are attached to a per-delivery span.

use berth_core::domain::message::Message;
use tracing::{Span, field, info_span};

/// Identity of a single worker in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    worker_id: usize,
}

impl WorkerContext {
    pub fn new(worker_id: usize) -> Self {
        Self { worker_id }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Creates the span covering one delivery
    ///
    /// `job_uuid` is recorded once the job record has been loaded.
    pub fn delivery_span(&self, message: &Message) -> Span {
        info_span!(
            "delivery",
            worker_id = self.worker_id,
            correlation_id = %message.uuid,
            job_id = message.job,
            job_uuid = field::Empty,
        )
    }
}
