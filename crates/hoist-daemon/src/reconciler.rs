//! Droplet reconciliation.
//!
//! Converges the droplet registry toward "every droplet has an address":
//! each droplet with `ip == null` is provisioned through the
//! [`CloudProvisioner`], and the result is written back through the store
//! together with the owning project. Droplets that already have an address
//! are never touched. A failed call leaves the droplet as it was for the next
//! pass to retry. An address the provider returned but the store could not
//! record is held in memory, and later passes retry only the write-back.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use hoist_state::{droplet_owners, ConfigStore};
use hoist_types::{DropletId, ResolvedDroplet};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::provisioner::{CloudProvisioner, ProvisionRequest, ProvisionedDroplet};

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Droplets that received an address, with that address.
    pub provisioned: BTreeMap<DropletId, String>,

    /// Droplets whose provisioning failed, with the reason.
    pub failed: BTreeMap<DropletId, String>,

    /// Droplets skipped because another pass is provisioning them.
    pub in_flight: Vec<DropletId>,

    /// Droplets referenced by more than one project.
    pub conflicts: Vec<DropletId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum DropletOutcome {
    Provisioned(String),
    Failed(String),
    InFlight,
    AlreadyProvisioned,
}

pub struct Reconciler {
    store: Arc<ConfigStore>,
    provisioner: Arc<dyn CloudProvisioner>,
    /// Per-droplet provisioning locks; never a global one.
    locks: DashMap<DropletId, Arc<Mutex<()>>>,
    /// Droplets created by the provider whose address is not yet in the store.
    unrecorded: DashMap<DropletId, ProvisionedDroplet>,
    max_concurrent: usize,
    image: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<ConfigStore>,
        provisioner: Arc<dyn CloudProvisioner>,
        max_concurrent: usize,
        image: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provisioner,
            locks: DashMap::new(),
            unrecorded: DashMap::new(),
            max_concurrent: max_concurrent.max(1),
            image: image.into(),
        }
    }

    /// Run one pass over every droplet lacking an address.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> ReconcileReport {
        let snapshot = self.store.snapshot();
        let owners = droplet_owners(&snapshot.topology);

        let mut report = ReconcileReport::default();
        for (droplet_id, projects) in &owners {
            if projects.len() > 1 {
                warn!(
                    droplet_id = %droplet_id,
                    owner = %projects[0],
                    projects = ?projects,
                    "Droplet is referenced by several projects; first owner is recorded"
                );
                report.conflicts.push(droplet_id.clone());
            }
        }

        let pending: Vec<ResolvedDroplet> = snapshot.resolved.unprovisioned().cloned().collect();
        if pending.is_empty() {
            debug!(version = snapshot.version, "No droplets to provision");
            return report;
        }
        info!(count = pending.len(), "Reconciling unprovisioned droplets");

        let outcomes: Vec<(DropletId, DropletOutcome)> = stream::iter(pending)
            .map(|droplet| {
                let owner = owners.get(&droplet.id).and_then(|p| p.first().cloned());
                async move {
                    let id = droplet.id.clone();
                    (id, self.provision_droplet(droplet, owner).await)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (id, outcome) in outcomes {
            match outcome {
                DropletOutcome::Provisioned(ip) => {
                    report.provisioned.insert(id, ip);
                }
                DropletOutcome::Failed(reason) => {
                    report.failed.insert(id, reason);
                }
                DropletOutcome::InFlight => report.in_flight.push(id),
                DropletOutcome::AlreadyProvisioned => {}
            }
        }
        report.in_flight.sort();

        info!(
            provisioned = report.provisioned.len(),
            failed = report.failed.len(),
            in_flight = report.in_flight.len(),
            "Reconcile pass finished"
        );
        report
    }

    #[instrument(skip(self, droplet), fields(droplet_id = %droplet.id))]
    async fn provision_droplet(
        &self,
        droplet: ResolvedDroplet,
        owner: Option<String>,
    ) -> DropletOutcome {
        let lock = self.locks.entry(droplet.id.clone()).or_default().clone();
        let Ok(_guard) = lock.try_lock_owned() else {
            debug!("Provisioning already in flight");
            return DropletOutcome::InFlight;
        };

        // A pass that finished while this one waited may have provisioned it.
        let current = self.store.snapshot();
        if current
            .resolved
            .droplets
            .get(&droplet.id)
            .map_or(true, |d| d.is_provisioned())
        {
            return DropletOutcome::AlreadyProvisioned;
        }

        let pending = self.unrecorded.get(&droplet.id).map(|entry| entry.clone());
        let provisioned = match pending {
            Some(pending) => {
                debug!(ip = %pending.ip, "Retrying write-back of provisioned droplet");
                pending
            }
            None => {
                let request = ProvisionRequest {
                    droplet: droplet.id.clone(),
                    size: droplet.size.clone(),
                    region: droplet.region.clone(),
                    role: droplet.role,
                    image: self.image.clone(),
                };
                match self.provisioner.provision(&request).await {
                    Ok(provisioned) => provisioned,
                    Err(e) => {
                        warn!(error = %e, "Provisioning failed; droplet stays unprovisioned");
                        return DropletOutcome::Failed(e.to_string());
                    }
                }
            }
        };

        let ip = provisioned.ip.clone();
        let written = self
            .store
            .update(|topology| {
                let Some(spec) = topology.droplets.get_mut(&droplet.id) else {
                    return false;
                };
                if spec.ip.is_some() {
                    return false;
                }
                spec.ip = Some(ip.clone());
                if spec.project.is_none() {
                    spec.project = owner.clone();
                }
                true
            })
            .await;

        match written {
            Ok((_, recorded)) => {
                self.unrecorded.remove(&droplet.id);
                if recorded {
                    info!(ip = %provisioned.ip, project = ?owner, "Droplet provisioned");
                    DropletOutcome::Provisioned(provisioned.ip)
                } else {
                    DropletOutcome::AlreadyProvisioned
                }
            }
            Err(e) => {
                warn!(
                    ip = %provisioned.ip,
                    error = %e,
                    "Provisioned droplet could not be recorded; write-back will be retried"
                );
                self.unrecorded.insert(droplet.id.clone(), provisioned);
                DropletOutcome::Failed(e.to_string())
            }
        }
    }
}
