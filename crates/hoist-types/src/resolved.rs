//! Fully-resolved topology consumed by the runtime.
//!
//! Produced by the merge step from a raw [`Topology`](crate::Topology): every
//! droplet has concrete `size`/`region`, every environment has a complete
//! [`HeartbeatConfig`], and enumerated fields are typed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::heartbeat::HeartbeatConfig;
use crate::ids::{DropletId, ServiceKey};
use crate::topology::{DropletRole, ServiceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDroplet {
    pub id: DropletId,
    pub ip: Option<String>,
    pub role: DropletRole,
    pub size: String,
    pub region: String,
    pub project: Option<String>,
}

impl ResolvedDroplet {
    pub fn is_provisioned(&self) -> bool {
        self.ip.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedService {
    pub name: String,
    pub kind: ServiceKind,
    pub port: Option<u16>,
    pub assigned_droplets: BTreeSet<DropletId>,
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEnvironment {
    pub project: String,
    pub name: String,
    pub heartbeat: HeartbeatConfig,
    /// Services followed by workers, in declaration order.
    pub services: Vec<ResolvedService>,
}

impl ResolvedEnvironment {
    pub fn key_for(&self, service: &ResolvedService) -> ServiceKey {
        ServiceKey::new(&self.project, &self.name, &service.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTopology {
    pub droplets: BTreeMap<DropletId, ResolvedDroplet>,
    pub environments: Vec<ResolvedEnvironment>,
}

impl ResolvedTopology {
    pub fn environment(&self, project: &str, name: &str) -> Option<&ResolvedEnvironment> {
        self.environments
            .iter()
            .find(|e| e.project == project && e.name == name)
    }

    /// Droplets still waiting for an address.
    pub fn unprovisioned(&self) -> impl Iterator<Item = &ResolvedDroplet> {
        self.droplets.values().filter(|d| !d.is_provisioned())
    }

    pub fn master(&self) -> Option<&ResolvedDroplet> {
        self.droplets
            .values()
            .find(|d| d.role == DropletRole::Master)
    }

    pub fn service_count(&self) -> usize {
        self.environments.iter().map(|e| e.services.len()).sum()
    }
}
