//! Repository layer
//!
//! The job store is the only persistent collaborator of the worker pool.
//! This module defines its contract as traits so the pipeline can run
//! against PostgreSQL in production and against memory in tests.
//!
//! A [`JobStore`] hands out [`JobConnection`]s. Each worker holds one
//! connection for its whole lifetime and never shares it.

mod jobs;
mod memory;

// Re-export traits
pub use jobs::{JobConnection, JobStore, StoreError};

// Re-export implementations
pub use memory::MemoryJobStore;
