//! Hoist Health - heartbeat probing and health state tracking
//!
//! Every `(droplet, service)` pair with an address and a port is probed on
//! its environment's `check_interval_seconds`, each probe bounded by
//! `health_timeout_seconds`. Results drive a small state machine:
//!
//! - **UNKNOWN**: no successful probe yet
//! - **HEALTHY**: last probe succeeded
//! - **DEGRADED**: a probe missed after being healthy
//! - **DOWN**: no success for longer than `failure_timeout_minutes`
//!
//! A coarser reporting loop per environment logs aggregate counts every
//! `interval_minutes`, and [`FleetHealthSummary`] exposes the same data to
//! scheduled jobs.

#![deny(unsafe_code)]

pub mod error;
pub mod monitor;
pub mod probes;
pub mod summary;
pub mod target;
pub mod tracker;

pub use error::{HealthError, HealthResult};
pub use monitor::{HealthEvent, HealthMonitor};
pub use probes::{Probe, ProbeResult, TcpProbe};
pub use summary::{FleetHealthSummary, StateCounts, TargetHealth};
pub use target::{probe_targets, ProbeTarget, TargetId};
pub use tracker::{HealthTracker, Transition};
