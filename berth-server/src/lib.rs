//! Berth Server
//!
//! Hosts the HTTP API and the worker pool in one process:
//! - API: submit deployments, query and delete jobs
//! - Repository: PostgreSQL job store
//! - Service: job business logic shared by the handlers
//!
//! Submitted jobs are persisted first and then announced to the workers
//! through the in-process message queue.

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
