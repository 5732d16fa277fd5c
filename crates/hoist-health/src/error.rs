//! Error types for hoist-health crate.

use thiserror::Error;

use crate::target::TargetId;

/// Errors that can occur while probing or managing monitored targets.
///
/// Probe errors are never fatal: the monitor turns them into misses.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Probe did not complete within the heartbeat timeout.
    #[error("probe timed out for {target} after {timeout_ms}ms")]
    ProbeTimeout { target: TargetId, timeout_ms: u64 },

    /// Probe ran but the target did not answer.
    #[error("probe failed for {target}: {reason}")]
    ProbeFailed { target: TargetId, reason: String },

    /// Target is not registered with the monitor.
    #[error("target not found: {0}")]
    TargetNotFound(TargetId),

    /// A probe loop is already running for this target.
    #[error("monitor already running for {0}")]
    MonitorAlreadyRunning(TargetId),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;
