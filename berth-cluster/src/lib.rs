//! Berth Cluster Client
//!
//! Abstractions over the remote compute clusters deployments are applied to.
//!
//! The worker pipeline only depends on the two traits defined here:
//! - [`ClusterResolver`] maps a cluster name from a deployment request to a target
//! - [`Cluster`] probes connectivity and applies a deployment
//!
//! [`HttpClusterRegistry`] is the production implementation. Each cluster is
//! fronted by a deployment agent reachable over HTTP; Berth hands it the
//! deployment request and records whether it was accepted. Rollout strategies
//! are entirely the agent's business.
//!
//! # Example
//!
//! ```no_run
//! use berth_cluster::{ClusterResolver, HttpClusterRegistry};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! # async fn example() -> berth_cluster::Result<()> {
//! let mut endpoints = HashMap::new();
//! endpoints.insert("prod-a".to_string(), "http://agent.prod-a:9000".to_string());
//!
//! let registry = HttpClusterRegistry::new(endpoints, reqwest::Client::new());
//! let cluster = registry.resolve("prod-a").await?;
//!
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
//! let reachable = cluster.probe(deadline).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod http;

pub use error::{ClusterError, Result};
pub use http::{HttpCluster, HttpClusterRegistry};

use async_trait::async_trait;
use berth_core::domain::deployment::DeploymentRequest;
use std::sync::Arc;
use tokio::time::Instant;

/// A deployment target
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Name the cluster was resolved under
    fn name(&self) -> &str;

    /// Checks that the cluster is reachable
    ///
    /// # Arguments
    /// * `deadline` - Point in time after which the probe must give up
    ///
    /// # Returns
    /// `Ok(false)` when the cluster answered but reported itself not ready
    async fn probe(&self, deadline: Instant) -> Result<bool>;

    /// Applies a deployment
    ///
    /// # Returns
    /// `Ok(false)` when the cluster answered but refused the deployment
    async fn deploy(&self, request: &DeploymentRequest) -> Result<bool>;
}

/// Looks up clusters by name
#[async_trait]
pub trait ClusterResolver: Send + Sync {
    /// Resolves a cluster, failing with [`ClusterError::NotFound`] for unknown names
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Cluster>>;
}
