//! Berth Core
//!
//! Core types shared by the Berth deployment service.
//!
//! This crate contains:
//! - Domain types: Job records, inbound queue messages and deployment requests
//! - DTOs: Projections returned over the HTTP surface

pub mod domain;
pub mod dto;
