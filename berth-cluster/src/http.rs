//! HTTP cluster client
//!
//! Talks to the deployment agent running in each cluster:
//! - `GET {base}/health` answers the connectivity probe
//! - `POST {base}/deployments` applies a deployment request

use async_trait::async_trait;
use berth_core::domain::deployment::DeploymentRequest;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::{Cluster, ClusterResolver};

/// Registry of agent-backed clusters, keyed by name
#[derive(Debug, Clone)]
pub struct HttpClusterRegistry {
    clusters: HashMap<String, Arc<HttpCluster>>,
}

impl HttpClusterRegistry {
    /// Create a registry from `name -> agent base URL` pairs
    ///
    /// The HTTP client is shared by every cluster, so timeouts and TLS
    /// settings configured on it apply to all of them.
    pub fn new(endpoints: HashMap<String, String>, client: Client) -> Self {
        let clusters = endpoints
            .into_iter()
            .map(|(name, base_url)| {
                let cluster = HttpCluster::new(name.clone(), base_url, client.clone());
                (name, Arc::new(cluster))
            })
            .collect();

        Self { clusters }
    }

    /// Names of all registered clusters, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.clusters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl ClusterResolver for HttpClusterRegistry {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn Cluster>> {
        self.clusters
            .get(name)
            .map(|cluster| Arc::clone(cluster) as Arc<dyn Cluster>)
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }
}

/// A single cluster reached through its deployment agent
#[derive(Debug, Clone)]
pub struct HttpCluster {
    name: String,
    /// Base URL of the agent (e.g., "http://agent.prod-a:9000")
    base_url: String,
    client: Client,
}

impl HttpCluster {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the agent
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Cluster for HttpCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, deadline: Instant) -> Result<bool> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClusterError::Timeout);
        }

        let url = format!("{}/health", self.base_url);
        debug!(cluster = %self.name, %url, "probing cluster");

        let response = self.client.get(&url).timeout(remaining).send().await?;

        Ok(response.status().is_success())
    }

    async fn deploy(&self, request: &DeploymentRequest) -> Result<bool> {
        let url = format!("{}/deployments", self.base_url);
        debug!(
            cluster = %self.name,
            application = %request.application,
            version = %request.version,
            "submitting deployment to cluster agent"
        );

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClusterError::api_error(status.as_u16(), error_text));
        }

        let body: DeployResponse = response
            .json()
            .await
            .map_err(|e| ClusterError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        if !body.accepted {
            debug!(
                cluster = %self.name,
                message = body.message.as_deref().unwrap_or(""),
                "cluster agent refused deployment"
            );
        }

        Ok(body.accepted)
    }
}

#[derive(Debug, Deserialize)]
struct DeployResponse {
    accepted: bool,
    #[serde(default)]
    message: Option<String>,
}
