//! Resolution of a raw [`Topology`] into a [`ResolvedTopology`].
//!
//! Pure and side-effect free. Heartbeat settings are layered built-in
//! default → global block → project block → environment block, each layer
//! overriding only the fields it names. Droplet `size`/`region` are defaulted
//! here and nowhere else.

use std::collections::BTreeMap;

use hoist_types::{
    DropletRole, HeartbeatConfig, ResolvedDroplet, ResolvedEnvironment, ResolvedService,
    ResolvedTopology, ServiceKey, ServiceKind, ServiceSpec, Topology, DEFAULT_REGION,
    DEFAULT_SIZE,
};

use crate::error::{ConfigValidationError, ValidationIssue};

/// Resolve defaults and inheritance.
///
/// Fails when a droplet role or service type is missing or not one of the
/// known values; all such problems are reported together.
pub fn resolve(topology: &Topology) -> Result<ResolvedTopology, ConfigValidationError> {
    let mut issues = Vec::new();

    let mut droplets = BTreeMap::new();
    for (id, spec) in &topology.droplets {
        let role = match spec.role.as_deref() {
            None => {
                issues.push(ValidationIssue::MissingRole { droplet: id.clone() });
                continue;
            }
            Some(raw) => match raw.parse::<DropletRole>() {
                Ok(role) => role,
                Err(_) => {
                    issues.push(ValidationIssue::UnknownRole {
                        droplet: id.clone(),
                        role: raw.to_string(),
                    });
                    continue;
                }
            },
        };

        droplets.insert(
            id.clone(),
            ResolvedDroplet {
                id: id.clone(),
                ip: spec.ip.clone(),
                role,
                size: spec.size.clone().unwrap_or_else(|| DEFAULT_SIZE.to_string()),
                region: spec
                    .region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                project: spec.project.clone(),
            },
        );
    }

    let global = HeartbeatConfig::default().overlay_block(topology.health_monitoring.as_ref());

    let mut environments = Vec::new();
    for (project_name, project) in &topology.projects {
        let project_heartbeat = global.overlay_block(project.health_monitoring.as_ref());

        for (env_name, env) in &project.environments {
            let heartbeat = project_heartbeat.overlay_block(env.health_monitoring.as_ref());
            let mut services = Vec::with_capacity(env.services.len() + env.workers.len());

            for (name, spec) in &env.services {
                let key = ServiceKey::new(project_name, env_name, name);
                if let Some(kind) = service_kind(&key, spec, None, &mut issues) {
                    services.push(resolved_service(name.clone(), kind, spec));
                }
            }

            for (index, spec) in env.workers.iter().enumerate() {
                let name = env.worker_name(index);
                let key = ServiceKey::new(project_name, env_name, &name);
                if let Some(kind) =
                    service_kind(&key, spec, Some(ServiceKind::Worker), &mut issues)
                {
                    services.push(resolved_service(name, kind, spec));
                }
            }

            environments.push(ResolvedEnvironment {
                project: project_name.clone(),
                name: env_name.clone(),
                heartbeat,
                services,
            });
        }
    }

    if issues.is_empty() {
        Ok(ResolvedTopology {
            droplets,
            environments,
        })
    } else {
        Err(ConfigValidationError(issues))
    }
}

fn service_kind(
    key: &ServiceKey,
    spec: &ServiceSpec,
    fallback: Option<ServiceKind>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<ServiceKind> {
    match (spec.kind.as_deref(), fallback) {
        (Some(raw), _) => match raw.parse::<ServiceKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                issues.push(ValidationIssue::UnknownServiceType {
                    service: key.clone(),
                    service_type: raw.to_string(),
                });
                None
            }
        },
        (None, Some(kind)) => Some(kind),
        (None, None) => {
            issues.push(ValidationIssue::MissingServiceType {
                service: key.clone(),
            });
            None
        }
    }
}

fn resolved_service(name: String, kind: ServiceKind, spec: &ServiceSpec) -> ResolvedService {
    ResolvedService {
        name,
        kind,
        port: spec.port,
        assigned_droplets: spec.assigned_droplets.iter().cloned().collect(),
        command: spec.command.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_types::{
        DropletId, DropletSpec, EnvironmentSpec, HealthMonitoringBlock, HeartbeatOverride,
        ProjectSpec,
    };

    fn full_override() -> HealthMonitoringBlock {
        HealthMonitoringBlock::new(HeartbeatOverride {
            interval_minutes: Some(20),
            check_interval_seconds: Some(90),
            failure_timeout_minutes: Some(15),
            health_timeout_seconds: Some(25),
            ..Default::default()
        })
    }

    fn topology() -> Topology {
        let mut topology = Topology::default();
        topology
            .droplets
            .insert(DropletId::new("web1"), DropletSpec::with_role(DropletRole::Web));

        let mut overridden = EnvironmentSpec {
            health_monitoring: Some(full_override()),
            ..Default::default()
        };
        overridden
            .services
            .insert("backend".into(), ServiceSpec::new(ServiceKind::Web).on("web1"));

        let mut project = ProjectSpec::default();
        project.environments.insert("prod".into(), overridden);
        project.environments.insert("uat".into(), EnvironmentSpec::default());
        topology.projects.insert("hostomatic".into(), project);
        topology
    }

    #[test]
    fn test_environment_override_wins_completely() {
        let resolved = resolve(&topology()).unwrap();
        let prod = resolved.environment("hostomatic", "prod").unwrap();
        assert_eq!(
            prod.heartbeat,
            HeartbeatConfig {
                interval_minutes: 20,
                check_interval_seconds: 90,
                failure_timeout_minutes: 15,
                health_timeout_seconds: 25,
            }
        );
    }

    #[test]
    fn test_missing_layers_inherit_from_parent_not_sibling() {
        let mut topology = topology();
        let project = topology.projects.get_mut("hostomatic").unwrap();
        project.health_monitoring = Some(HealthMonitoringBlock::new(HeartbeatOverride {
            failure_timeout_minutes: Some(7),
            ..Default::default()
        }));

        let resolved = resolve(&topology).unwrap();
        let uat = resolved.environment("hostomatic", "uat").unwrap();
        assert_eq!(uat.heartbeat.failure_timeout_minutes, 7);
        assert_eq!(uat.heartbeat.check_interval_seconds, 30);
        assert_eq!(uat.heartbeat.interval_minutes, 5);
    }

    #[test]
    fn test_project_without_override_uses_system_default() {
        let resolved = resolve(&topology()).unwrap();
        let uat = resolved.environment("hostomatic", "uat").unwrap();
        assert_eq!(uat.heartbeat, HeartbeatConfig::default());
    }

    #[test]
    fn test_global_layer_applies_before_project() {
        let mut topology = topology();
        topology.health_monitoring = Some(HealthMonitoringBlock::new(HeartbeatOverride {
            interval_minutes: Some(1),
            ..Default::default()
        }));

        let resolved = resolve(&topology).unwrap();
        assert_eq!(
            resolved.environment("hostomatic", "uat").unwrap().heartbeat.interval_minutes,
            1
        );
        assert_eq!(
            resolved.environment("hostomatic", "prod").unwrap().heartbeat.interval_minutes,
            20
        );
    }

    #[test]
    fn test_droplet_defaults() {
        let resolved = resolve(&topology()).unwrap();
        let web1 = &resolved.droplets[&DropletId::new("web1")];
        assert_eq!(web1.size, "s-1vcpu-1gb");
        assert_eq!(web1.region, "lon1");
        assert_eq!(web1.role, DropletRole::Web);
    }

    #[test]
    fn test_explicit_droplet_fields_are_kept() {
        let mut topology = topology();
        let spec = topology.droplets.get_mut(&DropletId::new("web1")).unwrap();
        spec.size = Some("s-2vcpu-4gb".into());
        spec.region = Some("ams3".into());

        let resolved = resolve(&topology).unwrap();
        let web1 = &resolved.droplets[&DropletId::new("web1")];
        assert_eq!(web1.size, "s-2vcpu-4gb");
        assert_eq!(web1.region, "ams3");
    }

    #[test]
    fn test_bad_roles_and_types_are_collected() {
        let mut topology = topology();
        topology
            .droplets
            .insert(DropletId::new("norole"), DropletSpec::default());
        topology.droplets.insert(
            DropletId::new("odd"),
            DropletSpec {
                role: Some("database".into()),
                ..Default::default()
            },
        );
        topology
            .projects
            .get_mut("hostomatic")
            .unwrap()
            .environments
            .get_mut("uat")
            .unwrap()
            .services
            .insert("cache".into(), ServiceSpec::default());

        let err = resolve(&topology).unwrap_err();
        assert_eq!(err.issues().len(), 3);
        assert!(err.issues().contains(&ValidationIssue::MissingRole {
            droplet: DropletId::new("norole")
        }));
        assert!(err
            .issues()
            .iter()
            .any(|i| matches!(i, ValidationIssue::MissingServiceType { .. })));
    }

    #[test]
    fn test_workers_follow_services_and_get_default_names() {
        let mut topology = topology();
        let uat = topology
            .projects
            .get_mut("hostomatic")
            .unwrap()
            .environments
            .get_mut("uat")
            .unwrap();
        uat.workers.push(ServiceSpec {
            command: Some("python worker.py".into()),
            ..ServiceSpec::default().on("web1")
        });

        let resolved = resolve(&topology).unwrap();
        let uat = resolved.environment("hostomatic", "uat").unwrap();
        assert_eq!(uat.services.len(), 1);
        assert_eq!(uat.services[0].name, "worker-1");
        assert_eq!(uat.services[0].kind, ServiceKind::Worker);
    }
}
