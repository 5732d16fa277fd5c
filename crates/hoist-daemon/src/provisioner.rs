//! Cloud Provisioning API seam.
//!
//! The reconciler only sees [`CloudProvisioner`]. [`HttpProvisioner`] is a
//! JSON-over-HTTP client for providers exposing a `POST /droplets` endpoint
//! that answers with the assigned address.

use std::time::Duration;

use async_trait::async_trait;
use hoist_types::{DropletId, DropletRole};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProvisioningError;

/// What the reconciler asks the provider to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionRequest {
    #[serde(rename = "name")]
    pub droplet: DropletId,
    pub size: String,
    pub region: String,
    pub role: DropletRole,
    pub image: String,
}

/// What the provider answers once a node exists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProvisionedDroplet {
    pub ip: String,

    /// Provider-side identifier, when the API returns one.
    #[serde(default)]
    pub provider_id: Option<String>,
}

/// External collaborator that turns a droplet spec into a running node.
#[async_trait]
pub trait CloudProvisioner: Send + Sync {
    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedDroplet, ProvisioningError>;
}

/// Provisioner used when no endpoint is configured: every call fails, so
/// droplets stay unprovisioned and are reported as such.
#[derive(Debug, Default)]
pub struct UnconfiguredProvisioner;

#[async_trait]
impl CloudProvisioner for UnconfiguredProvisioner {
    async fn provision(
        &self,
        _request: &ProvisionRequest,
    ) -> Result<ProvisionedDroplet, ProvisioningError> {
        Err(ProvisioningError::NotConfigured)
    }
}

/// JSON client for the Cloud Provisioning API.
#[derive(Debug, Clone)]
pub struct HttpProvisioner {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpProvisioner {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProvisioningError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ProvisioningError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProvisioningError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl CloudProvisioner for HttpProvisioner {
    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedDroplet, ProvisioningError> {
        let url = format!("{}/droplets", self.endpoint);
        debug!(droplet_id = %request.droplet, url = %url, "Calling provisioning API");

        let mut call = self.client.post(&url).json(request);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| ProvisioningError::Request {
            droplet: request.droplet.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisioningError::Rejected {
                droplet: request.droplet.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let droplet: ProvisionedDroplet =
            response
                .json()
                .await
                .map_err(|e| ProvisioningError::InvalidResponse {
                    droplet: request.droplet.clone(),
                    reason: e.to_string(),
                })?;

        if droplet.ip.trim().is_empty() {
            return Err(ProvisioningError::InvalidResponse {
                droplet: request.droplet.clone(),
                reason: "empty ip".to_string(),
            });
        }
        Ok(droplet)
    }
}
