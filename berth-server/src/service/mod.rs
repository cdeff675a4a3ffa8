//! Service Module
//!
//! Business logic layer for the server.

pub mod job;

// Re-export for convenience
pub use job as job_service;
