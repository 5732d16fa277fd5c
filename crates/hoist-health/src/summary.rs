//! Aggregate view of fleet health.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hoist_types::HealthState;
use serde::{Deserialize, Serialize};

use crate::target::TargetId;

/// Number of targets in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
}

impl StateCounts {
    pub fn add(&mut self, state: HealthState) {
        self.total += 1;
        match state {
            HealthState::Healthy => self.healthy += 1,
            HealthState::Degraded => self.degraded += 1,
            HealthState::Down => self.down += 1,
            HealthState::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub target: TargetId,
    pub state: HealthState,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_misses: u32,
}

/// Summary handed to jobs and logged by the reporting loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetHealthSummary {
    pub counts: StateCounts,

    /// Keyed by `project/environment`.
    pub environments: BTreeMap<String, StateCounts>,

    pub targets: Vec<TargetHealth>,

    pub summarized_at: DateTime<Utc>,
}

impl FleetHealthSummary {
    pub fn from_targets(mut targets: Vec<TargetHealth>, summarized_at: DateTime<Utc>) -> Self {
        targets.sort_by(|a, b| a.target.cmp(&b.target));

        let mut counts = StateCounts::default();
        let mut environments: BTreeMap<String, StateCounts> = BTreeMap::new();
        for target in &targets {
            counts.add(target.state);
            environments
                .entry(target.target.environment())
                .or_default()
                .add(target.state);
        }

        Self {
            counts,
            environments,
            targets,
            summarized_at,
        }
    }

    pub fn empty() -> Self {
        Self::from_targets(Vec::new(), Utc::now())
    }

    /// Counts for one `project/environment`, zero when nothing is monitored there.
    pub fn environment(&self, project: &str, environment: &str) -> StateCounts {
        self.environments
            .get(&format!("{project}/{environment}"))
            .copied()
            .unwrap_or_default()
    }

    pub fn all_healthy(&self) -> bool {
        self.counts.healthy == self.counts.total
    }
}
