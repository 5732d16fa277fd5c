//! Health state of a probed `(droplet, service)` pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Heartbeat-derived state.
///
/// Every target starts `Unknown`. A success always moves to `Healthy`; one
/// miss after `Healthy` moves to `Degraded`; `Down` is reached once the time
/// since the last success exceeds the failure timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Down,
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "UNKNOWN"),
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Down => write!(f, "DOWN"),
        }
    }
}
