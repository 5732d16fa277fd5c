//! Hoist Daemon library
//!
//! This crate provides the moving parts behind `hoist apply` and
//! `hoist run-scheduler`:
//! - Daemon configuration
//! - Cloud provisioner seam and HTTP client
//! - Droplet reconciler and one-shot apply
//! - Job executor and cron scheduler
//! - Runtime lifecycle with graceful shutdown

#![deny(unsafe_code)]

pub mod apply;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod provisioner;
pub mod reconciler;
pub mod runtime;
pub mod scheduler;

pub use apply::{allocate_ports, apply_once, plan, ApplyPlan, ApplyReport};
pub use clock::{Clock, SystemClock};
pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult, JobExecutionError, ProvisioningError};
pub use executor::{outcome_of, JobContext, JobExecutor, ProcessExecutor};
pub use provisioner::{CloudProvisioner, HttpProvisioner, ProvisionRequest, UnconfiguredProvisioner};
pub use reconciler::{ReconcileReport, Reconciler};
pub use runtime::{shutdown_signal, Runtime, RuntimeParts};
pub use scheduler::{Scheduler, TickReport};
