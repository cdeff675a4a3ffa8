//! Core domain types
//!
//! This module contains the core domain structures used across Berth services.
//! They are shared between the server (persistence, HTTP) and the worker pool
//! (execution), and own the decode rules for everything that crosses a queue
//! or storage boundary.

pub mod deployment;
pub mod job;
pub mod message;
