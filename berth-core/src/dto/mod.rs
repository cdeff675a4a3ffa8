//! Data Transfer Objects
//!
//! This module contains DTOs returned over the Berth HTTP surface. DTOs are
//! projections of domain entities that hide fields the API does not expose
//! (a job's payload and result stay internal).

pub mod job;
