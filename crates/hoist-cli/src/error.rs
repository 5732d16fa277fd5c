//! CLI error types

use std::process::ExitCode;

use hoist_daemon::DaemonError;
use hoist_state::StateError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Topology or jobs file could not be loaded or updated
    #[error(transparent)]
    State(#[from] StateError),

    /// Runtime error
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// Validation found problems (including warnings under `--strict`)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Apply finished but left droplets unprovisioned
    #[error("{0} droplet(s) could not be provisioned")]
    Unprovisioned(usize),

    /// Named job is not defined
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job ran and failed
    #[error("Job {name} failed: {reason}")]
    JobFailed { name: String, reason: String },

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code: 1 for anything structurally wrong with the input
    /// files, 2 for everything that went wrong while doing work.
    pub fn exit_code(&self) -> ExitCode {
        let invalid_input = |e: &StateError| {
            matches!(e, StateError::Validation(_) | StateError::Parse { .. })
        };
        let code = match self {
            CliError::Validation(_) => 1,
            CliError::State(e) if invalid_input(e) => 1,
            CliError::Daemon(DaemonError::State(e)) if invalid_input(e) => 1,
            _ => 2,
        };
        ExitCode::from(code)
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
