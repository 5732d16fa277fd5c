//! Raw topology document as persisted in `target.json`.
//!
//! These types mirror the file shape one-to-one. Enumerated fields (`role`,
//! `type`) stay as strings here so that validation can report every bad value
//! at once instead of failing on the first deserialization error. Unknown keys
//! are kept in `extra` maps and written back untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::heartbeat::HealthMonitoringBlock;
use crate::ids::DropletId;

/// Droplet size applied when the registry entry omits one.
pub const DEFAULT_SIZE: &str = "s-1vcpu-1gb";

/// Droplet region applied when the registry entry omits one.
pub const DEFAULT_REGION: &str = "lon1";

/// The whole topology document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Global heartbeat layer, applied before any project layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_monitoring: Option<HealthMonitoringBlock>,

    #[serde(default)]
    pub droplets: BTreeMap<DropletId, DropletSpec>,

    #[serde(default)]
    pub projects: BTreeMap<String, ProjectSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Topology {
    /// Iterate every environment as `(project, environment, spec)`.
    pub fn environments(&self) -> impl Iterator<Item = (&str, &str, &EnvironmentSpec)> {
        self.projects.iter().flat_map(|(project, spec)| {
            spec.environments
                .iter()
                .map(move |(env, env_spec)| (project.as_str(), env.as_str(), env_spec))
        })
    }
}

/// One entry of the droplet registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropletSpec {
    /// Assigned address; `null` until provisioned.
    #[serde(default)]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Owning project, written back by the reconciler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DropletSpec {
    pub fn with_role(role: DropletRole) -> Self {
        Self {
            role: Some(role.to_string()),
            ..Default::default()
        }
    }
}

/// A project: an optional heartbeat layer plus its environments.
///
/// Every key other than `health_monitoring` names an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_monitoring: Option<HealthMonitoringBlock>,

    #[serde(flatten)]
    pub environments: BTreeMap<String, EnvironmentSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_monitoring: Option<HealthMonitoringBlock>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<ServiceSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EnvironmentSpec {
    /// Name of the worker at `index`, falling back to `worker-<n>` (1-based).
    pub fn worker_name(&self, index: usize) -> String {
        self.workers
            .get(index)
            .and_then(|w| w.name.clone())
            .unwrap_or_else(|| format!("worker-{}", index + 1))
    }
}

/// A service or worker entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Only meaningful for `workers` entries; services are named by their key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub assigned_droplets: Vec<DropletId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServiceSpec {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn on(mut self, droplet: impl Into<DropletId>) -> Self {
        self.assigned_droplets.push(droplet.into());
        self
    }
}

/// Role of a droplet. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropletRole {
    Master,
    Web,
    Worker,
}

impl fmt::Display for DropletRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropletRole::Master => write!(f, "master"),
            DropletRole::Web => write!(f, "web"),
            DropletRole::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for DropletRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(DropletRole::Master),
            "web" => Ok(DropletRole::Web),
            "worker" => Ok(DropletRole::Worker),
            other => Err(format!("unknown droplet role '{other}'")),
        }
    }
}

/// Kind of workload a service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Master,
    Web,
    Worker,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Master => write!(f, "master"),
            ServiceKind::Web => write!(f, "web"),
            ServiceKind::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(ServiceKind::Master),
            "web" => Ok(ServiceKind::Web),
            "worker" => Ok(ServiceKind::Worker),
            other => Err(format!("unknown service type '{other}'")),
        }
    }
}
