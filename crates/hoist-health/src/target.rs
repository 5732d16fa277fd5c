//! Probe targets derived from the resolved topology.

use std::fmt;

use hoist_types::{DropletId, HeartbeatConfig, ResolvedTopology, ServiceKey};
use serde::{Deserialize, Serialize};

/// A monitored `(droplet, service)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub droplet: DropletId,
    pub service: ServiceKey,
}

impl TargetId {
    pub fn new(droplet: DropletId, service: ServiceKey) -> Self {
        Self { droplet, service }
    }

    /// `project/environment` this target belongs to.
    pub fn environment(&self) -> String {
        format!("{}/{}", self.service.project, self.service.environment)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.droplet)
    }
}

/// Everything a probe loop needs to know about one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub id: TargetId,
    pub address: String,
    pub port: u16,
    pub heartbeat: HeartbeatConfig,
}

impl ProbeTarget {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// All probe-able pairs: the droplet has an address and the service a port.
///
/// Workers carry no port and unprovisioned droplets no address, so neither
/// is ever probed.
pub fn probe_targets(resolved: &ResolvedTopology) -> Vec<ProbeTarget> {
    let mut targets = Vec::new();
    for env in &resolved.environments {
        for service in &env.services {
            let Some(port) = service.port else { continue };
            for droplet_id in &service.assigned_droplets {
                let Some(address) = resolved
                    .droplets
                    .get(droplet_id)
                    .and_then(|d| d.ip.clone())
                else {
                    continue;
                };
                targets.push(ProbeTarget {
                    id: TargetId::new(droplet_id.clone(), env.key_for(service)),
                    address,
                    port,
                    heartbeat: env.heartbeat,
                });
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_types::{
        DropletRole, ResolvedDroplet, ResolvedEnvironment, ResolvedService, ServiceKind,
    };

    fn droplet(id: &str, ip: Option<&str>) -> (DropletId, ResolvedDroplet) {
        (
            DropletId::new(id),
            ResolvedDroplet {
                id: DropletId::new(id),
                ip: ip.map(str::to_string),
                role: DropletRole::Web,
                size: "s-1vcpu-1gb".into(),
                region: "lon1".into(),
                project: None,
            },
        )
    }

    fn service(name: &str, kind: ServiceKind, port: Option<u16>) -> ResolvedService {
        ResolvedService {
            name: name.into(),
            kind,
            port,
            assigned_droplets: [DropletId::new("web1"), DropletId::new("web2")]
                .into_iter()
                .collect(),
            command: None,
        }
    }

    #[test]
    fn test_only_addressed_droplets_and_ported_services() {
        let resolved = ResolvedTopology {
            droplets: [droplet("web1", Some("10.0.0.1")), droplet("web2", None)]
                .into_iter()
                .collect(),
            environments: vec![ResolvedEnvironment {
                project: "hostomatic".into(),
                name: "uat".into(),
                heartbeat: HeartbeatConfig::default(),
                services: vec![
                    service("backend", ServiceKind::Web, Some(8001)),
                    service("worker-1", ServiceKind::Worker, None),
                ],
            }],
        };

        let targets = probe_targets(&resolved);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].socket_addr(), "10.0.0.1:8001");
        assert_eq!(targets[0].id.environment(), "hostomatic/uat");
        assert_eq!(targets[0].id.to_string(), "hostomatic/uat/backend@web1");
    }
}
