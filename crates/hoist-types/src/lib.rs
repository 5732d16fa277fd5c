//! Hoist Types - Core types for topology reconciliation and job scheduling
//!
//! Hoist converges a declared droplet topology (`target.json`) toward real
//! infrastructure and runs maintenance jobs (`jobs.yaml`) on a cron cadence.
//! This crate holds the data model shared by every other crate.
//!
//! ## Key Concepts
//!
//! - **Topology**: Raw, persisted form of the droplet registry and the
//!   project → environment → service tree
//! - **ResolvedTopology**: Fully defaulted and merged view consumed at runtime
//! - **HeartbeatConfig**: Probe cadence and failure thresholds, layered
//!   default → global → project → environment
//! - **Job / JobRunState**: Scheduled job definitions and their runtime record
//! - **CronSchedule**: Five-field cron grammar with next-fire computation

#![deny(unsafe_code)]

pub mod health;
pub mod heartbeat;
pub mod ids;
pub mod job;
pub mod resolved;
pub mod schedule;
pub mod topology;

// Re-export main types
pub use health::HealthState;
pub use heartbeat::{HealthMonitoringBlock, HeartbeatConfig, HeartbeatOverride};
pub use ids::{DropletId, ServiceKey};
pub use job::{Job, JobOutcome, JobRunRecord, JobRunState, JobsFile};
pub use resolved::{ResolvedDroplet, ResolvedEnvironment, ResolvedService, ResolvedTopology};
pub use schedule::{CronError, CronSchedule};
pub use topology::{
    DropletRole, DropletSpec, EnvironmentSpec, ProjectSpec, ServiceKind, ServiceSpec, Topology,
    DEFAULT_REGION, DEFAULT_SIZE,
};
