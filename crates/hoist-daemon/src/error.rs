//! Error types for hoist-daemon

use hoist_state::StateError;
use hoist_types::DropletId;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Topology store error
    #[error(transparent)]
    State(#[from] StateError),

    /// Provisioning client could not be built
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Failure of a single provisioning call. Never fatal to a reconcile pass.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// No endpoint configured for the Cloud Provisioning API
    #[error("no provisioning endpoint configured")]
    NotConfigured,

    /// HTTP client could not be built
    #[error("client setup failed: {0}")]
    Client(String),

    /// Request did not reach the API or no response arrived
    #[error("request for droplet {droplet} failed: {reason}")]
    Request { droplet: DropletId, reason: String },

    /// API answered with a non-success status
    #[error("API rejected droplet {droplet} with status {status}: {body}")]
    Rejected {
        droplet: DropletId,
        status: u16,
        body: String,
    },

    /// API answered but the body is not a usable droplet
    #[error("invalid response for droplet {droplet}: {reason}")]
    InvalidResponse { droplet: DropletId, reason: String },
}

/// Failure of a single job run. Recorded, never retried early.
#[derive(Debug, Error)]
pub enum JobExecutionError {
    /// Process could not be started
    #[error("job {job} could not be launched: {reason}")]
    Launch { job: String, reason: String },

    /// Process exited unsuccessfully
    #[error("job {job} exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit {
        job: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Process ran past its `timeout_seconds`
    #[error("job {job} timed out after {after_secs}s")]
    TimedOut { job: String, after_secs: u64 },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
