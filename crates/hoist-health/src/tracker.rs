//! Per-target health state machine.
//!
//! ```text
//!   UNKNOWN --success--> HEALTHY --miss--> DEGRADED
//!      |                    |                 |
//!      +------ no success for longer than failure_timeout ------> DOWN
//!   any state --success--> HEALTHY
//! ```

use chrono::{DateTime, Duration, Utc};
use hoist_types::HealthState;
use serde::Serialize;

/// State change produced by recording a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthTracker {
    state: HealthState,
    registered_at: DateTime<Utc>,
    last_success: Option<DateTime<Utc>>,
    last_probe: Option<DateTime<Utc>>,
    consecutive_misses: u32,
    #[serde(skip)]
    failure_timeout: Duration,
}

impl HealthTracker {
    pub fn new(registered_at: DateTime<Utc>, failure_timeout: std::time::Duration) -> Self {
        Self {
            state: HealthState::Unknown,
            registered_at,
            last_success: None,
            last_probe: None,
            consecutive_misses: 0,
            failure_timeout: Duration::from_std(failure_timeout).unwrap_or(Duration::MAX),
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_probe(&self) -> Option<DateTime<Utc>> {
        self.last_probe
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) -> Option<Transition> {
        self.last_probe = Some(at);
        self.last_success = Some(at);
        self.consecutive_misses = 0;
        self.move_to(HealthState::Healthy)
    }

    /// Record a failed or timed-out probe.
    ///
    /// Elapsed time is measured from the last success, or from registration
    /// when the target has never answered.
    pub fn record_miss(&mut self, at: DateTime<Utc>) -> Option<Transition> {
        self.last_probe = Some(at);
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);

        let since = self.last_success.unwrap_or(self.registered_at);
        let next = if at - since > self.failure_timeout {
            HealthState::Down
        } else if self.state == HealthState::Healthy {
            HealthState::Degraded
        } else {
            self.state
        };
        self.move_to(next)
    }

    fn move_to(&mut self, next: HealthState) -> Option<Transition> {
        if next == self.state {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(transition)
    }
}
