//! Hoist State - topology store, merge engine and port allocation
//!
//! This crate owns everything that touches the declared configuration:
//!
//! - **ConfigStore**: loads `target.json` and `jobs.yaml`, validates them,
//!   and publishes immutable versioned snapshots with atomic on-disk writes
//! - **MergeEngine** ([`resolve`]): pure defaulting and heartbeat layering
//! - **Validation** ([`validate`]): fatal issues plus non-fatal warnings
//! - **PortAllocator**: deterministic, collision-free ports for web services

#![deny(unsafe_code)]

pub mod error;
pub mod merge;
pub mod ports;
pub mod store;
pub mod validate;

pub use error::{
    ConfigValidationError, StateError, StateResult, ValidationIssue, ValidationWarning,
};
pub use merge::resolve;
pub use ports::{AssignedPort, PortAllocator, DEFAULT_BASE_PORT, DEFAULT_RANGE_SIZE};
pub use store::{read_jobs, ConfigStore, Snapshot};
pub use validate::{droplet_owners, validate, Validated};
