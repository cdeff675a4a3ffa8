//! Repository Module
//!
//! Data access layer for the server.

pub mod job;

// Re-export for convenience
pub use job::PgJobStore;
