//! Error types for hoist-state crate.
//!
//! Validation problems are collected into a single [`ConfigValidationError`]
//! so an operator sees every issue of a broken file in one pass. Non-fatal
//! findings are reported separately as [`ValidationWarning`]s.

use std::fmt;
use std::path::PathBuf;

use hoist_types::{CronError, DropletId, ServiceKey};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading, mutating or persisting the topology.
#[derive(Debug, Error)]
pub enum StateError {
    /// The topology or job list is structurally invalid.
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Every port of the allocation range is already taken in the environment.
    #[error("no free port left for {service} in range {base_port}..{end}")]
    PortRangeExhausted {
        service: ServiceKey,
        base_port: u16,
        end: u32,
    },

    #[error("failed to persist topology to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// One structural problem found while validating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingRole { droplet: DropletId },
    UnknownRole { droplet: DropletId, role: String },
    MissingServiceType { service: ServiceKey },
    UnknownServiceType {
        service: ServiceKey,
        service_type: String,
    },
    DanglingDroplet { service: ServiceKey, droplet: DropletId },
    DuplicateJob { name: String },
    MalformedCron { job: String, reason: String },
    DuplicateWorker { service: ServiceKey },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRole { droplet } => write!(f, "droplet '{droplet}' has no role"),
            Self::UnknownRole { droplet, role } => {
                write!(f, "droplet '{droplet}' has unknown role '{role}'")
            }
            Self::MissingServiceType { service } => {
                write!(f, "service '{service}' has no type")
            }
            Self::UnknownServiceType {
                service,
                service_type,
            } => write!(f, "service '{service}' has unknown type '{service_type}'"),
            Self::DanglingDroplet { service, droplet } => {
                write!(f, "service '{service}' references undefined droplet '{droplet}'")
            }
            Self::DuplicateJob { name } => write!(f, "job name '{name}' is defined more than once"),
            Self::MalformedCron { job, reason } => {
                write!(f, "job '{job}' has a malformed schedule: {reason}")
            }
            Self::DuplicateWorker { service } => {
                write!(f, "worker name '{service}' is used more than once")
            }
        }
    }
}

/// Every issue found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration is invalid ({} issue(s)): {}", .0.len(), join(.0))]
pub struct ConfigValidationError(pub Vec<ValidationIssue>);

impl ConfigValidationError {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    pub(crate) fn cron(job: &str, err: &CronError) -> ValidationIssue {
        ValidationIssue::MalformedCron {
            job: job.to_string(),
            reason: err.to_string(),
        }
    }
}

fn join(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Non-fatal configuration findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Services of several projects reference the droplet; the first owner wins.
    SharedDroplet {
        droplet: DropletId,
        owner: String,
        others: Vec<String>,
    },
    NoMasterDroplet,
    DuplicatePortOnDroplet {
        droplet: DropletId,
        port: u16,
        services: Vec<ServiceKey>,
    },
    WorkerWithPort { service: ServiceKey, port: u16 },
    UnassignedWebService { service: ServiceKey },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedDroplet {
                droplet,
                owner,
                others,
            } => write!(
                f,
                "droplet '{droplet}' is referenced by projects {owner}, {}; \
                 '{owner}' is recorded as owner",
                others.join(", ")
            ),
            Self::NoMasterDroplet => write!(f, "no droplet has role 'master'"),
            Self::DuplicatePortOnDroplet {
                droplet,
                port,
                services,
            } => write!(
                f,
                "port {port} is used by {} services on droplet '{droplet}'",
                services.len()
            ),
            Self::WorkerWithPort { service, port } => {
                write!(f, "worker '{service}' declares port {port}, which is ignored")
            }
            Self::UnassignedWebService { service } => {
                write!(f, "web service '{service}' is not assigned to any droplet")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_json_names_the_bad_service_type() {
        let issue = ValidationIssue::UnknownServiceType {
            service: ServiceKey::new("hostomatic", "uat", "cache"),
            service_type: "database".into(),
        };

        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "unknown_service_type");
        assert_eq!(json["service_type"], "database");
        assert_eq!(json["service"]["service"], "cache");
        assert_eq!(
            issue.to_string(),
            "service 'hostomatic/uat/cache' has unknown type 'database'"
        );
    }

    #[test]
    fn test_warning_json_is_tagged() {
        let warning = ValidationWarning::NoMasterDroplet;
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "no_master_droplet");
    }
}
