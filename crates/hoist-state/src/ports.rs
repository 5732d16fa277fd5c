//! Deterministic port assignment for web services.
//!
//! The preferred port of a service is
//! `base_port + blake3_keyed("project/environment/service") mod range_size`.
//! The hash key is a fixed constant, so the result is identical across runs,
//! processes and machines. On collision with any other port of the same
//! environment the allocator probes upward, wrapping inside the range.

use std::collections::BTreeSet;

use hoist_types::{ServiceKey, ServiceKind, Topology};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

/// Fixed key for the port hash. Changing it moves every allocated port.
const PORT_HASH_KEY: [u8; 32] = *b"hoist/port-allocator/v1/00000000";

pub const DEFAULT_BASE_PORT: u16 = 8000;
pub const DEFAULT_RANGE_SIZE: u16 = 2000;

/// A port written by an allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedPort {
    pub service: ServiceKey,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    base_port: u16,
    range_size: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT, DEFAULT_RANGE_SIZE)
    }
}

impl PortAllocator {
    /// The range is clamped so that it never runs past port 65535.
    pub fn new(base_port: u16, range_size: u16) -> Self {
        let room = u16::MAX - base_port;
        Self {
            base_port,
            range_size: range_size.clamp(1, room.saturating_add(1).max(1)),
        }
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub fn range_size(&self) -> u16 {
        self.range_size
    }

    /// Port the service gets when nothing else in its environment holds it.
    pub fn preferred_port(&self, service: &ServiceKey) -> u16 {
        self.base_port + self.offset(service)
    }

    fn offset(&self, service: &ServiceKey) -> u16 {
        let hash = blake3::keyed_hash(&PORT_HASH_KEY, service.path().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % u64::from(self.range_size)) as u16
    }

    /// Assign a port to every web service that lacks one.
    ///
    /// Services already carrying a port are never touched, so running the
    /// pass again on its own output assigns nothing.
    pub fn assign(&self, topology: &mut Topology) -> StateResult<Vec<AssignedPort>> {
        let mut assigned = Vec::new();

        for (project, spec) in topology.projects.iter_mut() {
            for (env_name, env) in spec.environments.iter_mut() {
                let mut taken: BTreeSet<u16> = env
                    .services
                    .values()
                    .chain(env.workers.iter())
                    .filter_map(|s| s.port)
                    .collect();

                for (name, service) in env.services.iter_mut() {
                    let allocatable = service
                        .kind
                        .as_deref()
                        .and_then(|k| k.parse::<ServiceKind>().ok())
                        .is_some_and(is_allocatable);
                    if !allocatable || service.port.is_some() {
                        continue;
                    }

                    let key = ServiceKey::new(project, env_name, name);
                    let port = self.probe(&key, &taken)?;
                    taken.insert(port);
                    service.port = Some(port);

                    debug!(
                        project = %project,
                        environment = %env_name,
                        service = %name,
                        port,
                        preferred = self.preferred_port(&key),
                        "Port assigned"
                    );
                    assigned.push(AssignedPort { service: key, port });
                }
            }
        }

        if !assigned.is_empty() {
            info!(count = assigned.len(), "Port allocation pass assigned new ports");
        }
        Ok(assigned)
    }

    fn probe(&self, key: &ServiceKey, taken: &BTreeSet<u16>) -> StateResult<u16> {
        let start = u32::from(self.offset(key));
        let range = u32::from(self.range_size);
        (0..range)
            .map(|step| self.base_port + ((start + step) % range) as u16)
            .find(|port| !taken.contains(port))
            .ok_or_else(|| StateError::PortRangeExhausted {
                service: key.clone(),
                base_port: self.base_port,
                end: u32::from(self.base_port) + u32::from(self.range_size),
            })
    }
}

/// Whether a service of this kind takes part in allocation.
pub fn is_allocatable(kind: ServiceKind) -> bool {
    kind == ServiceKind::Web
}
