//! Structural validation of the topology and job list.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use hoist_types::{
    CronSchedule, DropletId, DropletRole, Job, ResolvedTopology, ServiceKey, ServiceKind, Topology,
};
use tracing::debug;

use crate::error::{ConfigValidationError, ValidationIssue, ValidationWarning};
use crate::merge::resolve;

/// Output of a successful validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub resolved: ResolvedTopology,
    pub warnings: Vec<ValidationWarning>,
}

/// Validate a topology and job list together.
///
/// Fatal problems (missing or unknown role/type, dangling droplet reference,
/// duplicate job or worker name, malformed cron) are returned together as a
/// [`ConfigValidationError`]. Anything else worth an operator's attention
/// comes back as warnings.
pub fn validate(topology: &Topology, jobs: &[Job]) -> Result<Validated, ConfigValidationError> {
    let mut issues = Vec::new();

    let resolved = match resolve(topology) {
        Ok(resolved) => Some(resolved),
        Err(ConfigValidationError(found)) => {
            issues.extend(found);
            None
        }
    };

    check_references(topology, &mut issues);
    check_jobs(jobs, &mut issues);

    match resolved {
        Some(resolved) if issues.is_empty() => {
            let warnings = warnings(topology, &resolved);
            debug!(
                droplets = resolved.droplets.len(),
                environments = resolved.environments.len(),
                jobs = jobs.len(),
                warnings = warnings.len(),
                "Configuration validated"
            );
            Ok(Validated { resolved, warnings })
        }
        _ => Err(ConfigValidationError(issues)),
    }
}

fn check_references(topology: &Topology, issues: &mut Vec<ValidationIssue>) {
    for (project, env_name, env) in topology.environments() {
        let mut names: HashSet<String> = env.services.keys().cloned().collect();

        let services = env.services.iter().map(|(n, s)| (n.clone(), s));
        let workers = env
            .workers
            .iter()
            .enumerate()
            .map(|(i, s)| (env.worker_name(i), s));

        for (index, (name, spec)) in services.chain(workers).enumerate() {
            let key = ServiceKey::new(project, env_name, &name);

            if index >= env.services.len() && !names.insert(name) {
                issues.push(ValidationIssue::DuplicateWorker {
                    service: key.clone(),
                });
            }

            for droplet in &spec.assigned_droplets {
                if !topology.droplets.contains_key(droplet) {
                    issues.push(ValidationIssue::DanglingDroplet {
                        service: key.clone(),
                        droplet: droplet.clone(),
                    });
                }
            }
        }
    }
}

fn check_jobs(jobs: &[Job], issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for job in jobs {
        if !seen.insert(job.name.as_str()) {
            issues.push(ValidationIssue::DuplicateJob {
                name: job.name.clone(),
            });
        }
        if let Err(err) = CronSchedule::parse(&job.schedule) {
            issues.push(ConfigValidationError::cron(&job.name, &err));
        }
    }
}

/// Projects referencing each droplet, in discovery order.
///
/// Discovery walks projects, environments and services in sorted order, then
/// workers in declaration order, so the first entry is a stable owner.
pub fn droplet_owners(topology: &Topology) -> BTreeMap<DropletId, Vec<String>> {
    let mut owners: BTreeMap<DropletId, Vec<String>> = BTreeMap::new();
    for (project, _, env) in topology.environments() {
        for spec in env.services.values().chain(env.workers.iter()) {
            for droplet in &spec.assigned_droplets {
                let entry = owners.entry(droplet.clone()).or_default();
                if !entry.iter().any(|p| p == project) {
                    entry.push(project.to_string());
                }
            }
        }
    }
    owners
}

fn warnings(topology: &Topology, resolved: &ResolvedTopology) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for (droplet, projects) in droplet_owners(topology) {
        if let Some((owner, others)) = projects.split_first() {
            if !others.is_empty() {
                warnings.push(ValidationWarning::SharedDroplet {
                    droplet,
                    owner: owner.clone(),
                    others: others.to_vec(),
                });
            }
        }
    }

    if !resolved
        .droplets
        .values()
        .any(|d| d.role == DropletRole::Master)
    {
        warnings.push(ValidationWarning::NoMasterDroplet);
    }

    let mut by_port: BTreeMap<(DropletId, u16), BTreeSet<ServiceKey>> = BTreeMap::new();
    for env in &resolved.environments {
        for service in &env.services {
            let key = env.key_for(service);
            match (service.kind, service.port) {
                (ServiceKind::Worker, Some(port)) => {
                    warnings.push(ValidationWarning::WorkerWithPort { service: key, port });
                    continue;
                }
                (ServiceKind::Web, _) if service.assigned_droplets.is_empty() => {
                    warnings.push(ValidationWarning::UnassignedWebService {
                        service: key.clone(),
                    });
                }
                _ => {}
            }

            if let Some(port) = service.port {
                for droplet in &service.assigned_droplets {
                    by_port
                        .entry((droplet.clone(), port))
                        .or_default()
                        .insert(key.clone());
                }
            }
        }
    }

    for ((droplet, port), services) in by_port {
        if services.len() > 1 {
            warnings.push(ValidationWarning::DuplicatePortOnDroplet {
                droplet,
                port,
                services: services.into_iter().collect(),
            });
        }
    }

    warnings
}
