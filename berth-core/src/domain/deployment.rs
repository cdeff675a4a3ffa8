//! Deployment request
//!
//! The decoded form of a job payload. Berth only validates the shape; the
//! coordinates and the strategy are interpreted by the cluster agent.

use serde::{Deserialize, Serialize};

/// What to deploy and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentRequest {
    /// Name used to resolve the target cluster
    pub cluster: String,
    pub namespace: String,
    pub application: String,
    pub version: String,
    /// Rollout strategy, passed through untouched
    pub strategy: String,
}

impl DeploymentRequest {
    /// Decodes and validates a job payload
    pub fn decode(payload: &str) -> Result<Self, PayloadError> {
        let request: DeploymentRequest = serde_json::from_str(payload)?;
        request.validate()?;
        Ok(request)
    }

    /// Checks that every coordinate needed to address a deployment is present
    pub fn validate(&self) -> Result<(), PayloadError> {
        let required = [
            ("cluster", &self.cluster),
            ("namespace", &self.namespace),
            ("application", &self.application),
            ("version", &self.version),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PayloadError::EmptyField(field));
            }
        }

        Ok(())
    }

    /// Serializes the request into a job payload
    pub fn to_payload(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed deployment request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("deployment request field `{0}` must not be empty")]
    EmptyField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"cluster":"prod-a","namespace":"ns1","application":"app1","version":"v2","strategy":"rolling"}"#;

    #[test]
    fn test_decode_valid_payload() {
        let request = DeploymentRequest::decode(PAYLOAD).unwrap();
        assert_eq!(request.cluster, "prod-a");
        assert_eq!(request.namespace, "ns1");
        assert_eq!(request.application, "app1");
        assert_eq!(request.version, "v2");
        assert_eq!(request.strategy, "rolling");
    }

    #[test]
    fn test_strategy_is_opaque() {
        let payload = PAYLOAD.replace("rolling", "");
        assert_eq!(DeploymentRequest::decode(&payload).unwrap().strategy, "");
    }

    #[test]
    fn test_decode_rejects_missing_and_unknown_fields() {
        let missing = r#"{"cluster":"prod-a","namespace":"ns1"}"#;
        assert!(matches!(
            DeploymentRequest::decode(missing),
            Err(PayloadError::Malformed(_))
        ));

        let unknown = PAYLOAD.replace("\"strategy\"", "\"replicas\":3,\"strategy\"");
        assert!(matches!(
            DeploymentRequest::decode(&unknown),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_cluster() {
        let payload = PAYLOAD.replace("prod-a", " ");
        assert!(matches!(
            DeploymentRequest::decode(&payload),
            Err(PayloadError::EmptyField("cluster"))
        ));
    }

    #[test]
    fn test_payload_round_trip() {
        let request = DeploymentRequest::decode(PAYLOAD).unwrap();
        assert_eq!(request.to_payload().unwrap(), PAYLOAD);
    }
}
