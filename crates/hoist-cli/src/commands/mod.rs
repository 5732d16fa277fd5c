//! CLI command implementations

pub mod apply;
pub mod jobs;
pub mod ports;
pub mod run_job;
pub mod scheduler;
pub mod summary;
pub mod validate;

use std::path::PathBuf;

use hoist_daemon::DaemonConfig;
use hoist_state::{ConfigStore, PortAllocator};
use tracing::debug;

use crate::error::CliResult;
use crate::output::OutputFormat;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: DaemonConfig,
    pub format: OutputFormat,
    /// Whether the jobs file was named explicitly; a missing default is not an error.
    pub jobs_explicit: bool,
}

impl Context {
    pub fn topology_path(&self) -> &PathBuf {
        &self.config.paths.topology
    }

    pub fn jobs_path(&self) -> Option<&PathBuf> {
        let path = &self.config.paths.jobs;
        if self.jobs_explicit || path.exists() {
            Some(path)
        } else {
            debug!(path = %path.display(), "No jobs file; continuing without jobs");
            None
        }
    }

    /// Load and validate the topology and jobs.
    pub async fn load_store(&self) -> CliResult<ConfigStore> {
        let store =
            ConfigStore::load(self.topology_path(), self.jobs_path().map(PathBuf::as_path)).await?;
        Ok(store)
    }

    pub fn allocator(&self) -> PortAllocator {
        PortAllocator::new(self.config.ports.base_port, self.config.ports.range_size)
    }
}
