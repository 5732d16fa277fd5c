//! One-shot apply: port allocation followed by a reconcile pass.

use hoist_state::{AssignedPort, ConfigStore, PortAllocator};
use hoist_types::DropletId;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::DaemonResult;
use crate::reconciler::{ReconcileReport, Reconciler};

/// What an apply would change, computed without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyPlan {
    pub ports: Vec<AssignedPort>,
    pub provision: Vec<DropletId>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.provision.is_empty()
    }
}

/// What an apply changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub ports: Vec<AssignedPort>,
    pub reconcile: ReconcileReport,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.reconcile.is_clean()
    }
}

/// Dry run against the current snapshot.
pub fn plan(store: &ConfigStore, allocator: &PortAllocator) -> DaemonResult<ApplyPlan> {
    let snapshot = store.snapshot();
    let mut scratch = snapshot.topology.clone();
    let ports = allocator.assign(&mut scratch)?;
    let provision = snapshot
        .resolved
        .unprovisioned()
        .map(|d| d.id.clone())
        .collect();
    Ok(ApplyPlan { ports, provision })
}

/// Assign ports to every web service lacking one and publish the result.
///
/// Allocation runs on a scratch copy; nothing is published unless every
/// service got a port.
#[instrument(skip_all)]
pub async fn allocate_ports(
    store: &ConfigStore,
    allocator: &PortAllocator,
) -> DaemonResult<Vec<AssignedPort>> {
    let (snapshot, assigned) = store
        .update(|topology| {
            let mut scratch = topology.clone();
            let assigned = allocator.assign(&mut scratch)?;
            *topology = scratch;
            Ok::<_, hoist_state::StateError>(assigned)
        })
        .await?;
    let assigned = assigned?;

    if !assigned.is_empty() {
        info!(count = assigned.len(), version = snapshot.version, "Ports persisted");
    }
    Ok(assigned)
}

/// Allocate ports, then provision every droplet still lacking an address.
pub async fn apply_once(
    store: &ConfigStore,
    allocator: &PortAllocator,
    reconciler: &Reconciler,
) -> DaemonResult<ApplyReport> {
    let ports = allocate_ports(store, allocator).await?;
    let reconcile = reconciler.reconcile().await;
    Ok(ApplyReport { ports, reconcile })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::UnconfiguredProvisioner;
    use hoist_types::{
        DropletRole, DropletSpec, EnvironmentSpec, ProjectSpec, ServiceKind, ServiceSpec, Topology,
    };
    use std::sync::Arc;

    fn topology() -> Topology {
        let mut topology = Topology::default();
        let mut master = DropletSpec::with_role(DropletRole::Master);
        master.ip = Some("10.0.0.1".into());
        topology.droplets.insert("master".into(), master);
        topology
            .droplets
            .insert("web1".into(), DropletSpec::with_role(DropletRole::Web));

        let mut uat = EnvironmentSpec::default();
        uat.services
            .insert("backend".into(), ServiceSpec::new(ServiceKind::Web).on("web1"));
        uat.services
            .insert("frontend".into(), ServiceSpec::new(ServiceKind::Web).on("web1"));
        uat.services.insert(
            "admin".into(),
            ServiceSpec::new(ServiceKind::Web).with_port(8004).on("web1"),
        );
        let mut project = ProjectSpec::default();
        project.environments.insert("uat".into(), uat);
        topology.projects.insert("hostomatic".into(), project);
        topology
    }

    fn port_of(store: &ConfigStore, service: &str) -> Option<u16> {
        store.snapshot().topology.projects["hostomatic"].environments["uat"].services[service].port
    }

    #[tokio::test]
    async fn test_ports_are_assigned_once_and_stable() {
        let store = ConfigStore::from_parts(topology(), Vec::new()).unwrap();
        let allocator = PortAllocator::new(8000, 2000);

        let first = allocate_ports(&store, &allocator).await.unwrap();
        assert_eq!(first.len(), 2);
        let backend = port_of(&store, "backend").unwrap();
        let frontend = port_of(&store, "frontend").unwrap();
        assert_ne!(backend, frontend);
        assert_eq!(port_of(&store, "admin"), Some(8004));
        assert_eq!(store.snapshot().version, 2);

        let second = allocate_ports(&store, &allocator).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(port_of(&store, "backend"), Some(backend));
        assert_eq!(port_of(&store, "frontend"), Some(frontend));
        assert_eq!(store.snapshot().version, 2);

        let fresh = ConfigStore::from_parts(topology(), Vec::new()).unwrap();
        allocate_ports(&fresh, &allocator).await.unwrap();
        assert_eq!(port_of(&fresh, "backend"), Some(backend));
        assert_eq!(port_of(&fresh, "frontend"), Some(frontend));
    }

    #[tokio::test]
    async fn test_exhausted_range_publishes_nothing() {
        let store = ConfigStore::from_parts(topology(), Vec::new()).unwrap();
        let allocator = PortAllocator::new(8004, 1);

        assert!(allocate_ports(&store, &allocator).await.is_err());
        assert_eq!(store.snapshot().version, 1);
        assert_eq!(port_of(&store, "backend"), None);
    }

    #[test]
    fn test_plan_writes_nothing() {
        let store = ConfigStore::from_parts(topology(), Vec::new()).unwrap();
        let plan = plan(&store, &PortAllocator::new(8000, 2000)).unwrap();

        assert_eq!(plan.ports.len(), 2);
        assert_eq!(plan.provision, vec![DropletId::new("web1")]);
        assert_eq!(port_of(&store, "backend"), None);
        assert_eq!(store.snapshot().version, 1);
    }

    #[tokio::test]
    async fn test_apply_reports_failed_provisioning() {
        let store = Arc::new(ConfigStore::from_parts(topology(), Vec::new()).unwrap());
        let reconciler =
            Reconciler::new(store.clone(), Arc::new(UnconfiguredProvisioner), 2, "img");

        let report = apply_once(&store, &PortAllocator::new(8000, 2000), &reconciler)
            .await
            .unwrap();
        assert_eq!(report.ports.len(), 2);
        assert!(!report.is_clean());
        assert!(report.reconcile.failed.contains_key(&DropletId::new("web1")));
    }
}
