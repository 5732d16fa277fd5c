//! Heartbeat probes.
//!
//! A probe answers one question: did the target respond just now? Timing
//! out is the monitor's job, not the probe's; a probe may block for as long
//! as its transport lets it and will be cancelled by the caller.

mod tcp;

pub use tcp::TcpProbe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HealthResult;
use crate::target::{ProbeTarget, TargetId};

/// Result of a probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: TargetId,
    pub success: bool,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(target: TargetId, latency_ms: u64) -> Self {
        Self {
            target,
            success: true,
            latency_ms,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(target: TargetId, message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            target,
            success: false,
            latency_ms,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn timeout(target: TargetId, timeout_ms: u64) -> Self {
        Self {
            target,
            success: false,
            latency_ms: timeout_ms,
            message: Some(format!("Probe timed out after {}ms", timeout_ms)),
            timestamp: Utc::now(),
        }
    }
}

/// Trait for heartbeat probes.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe name, used in logs.
    fn name(&self) -> &str;

    /// Execute the probe once.
    ///
    /// An `Err` is counted as a miss, exactly like an unsuccessful result.
    async fn execute(&self, target: &ProbeTarget) -> HealthResult<ProbeResult>;
}
