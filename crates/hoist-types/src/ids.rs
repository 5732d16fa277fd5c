//! Strongly-typed identifiers for topology entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a droplet in the registry (the key under `droplets`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DropletId(String);

impl DropletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DropletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DropletId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fully-qualified service address: `(project, environment, service)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    pub project: String,
    pub environment: String,
    pub service: String,
}

impl ServiceKey {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            service: service.into(),
        }
    }

    /// Canonical `project/environment/service` form, also the port hash input.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.project, self.environment, self.service)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.environment, self.service)
    }
}
