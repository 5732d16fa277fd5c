//! Heartbeat configuration and its partial override form.
//!
//! A [`HeartbeatConfig`] is always complete. Each layer of the topology may
//! carry a [`HeartbeatOverride`] naming any subset of the four fields;
//! [`HeartbeatConfig::overlay`] produces the child value from its parent.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fully-resolved heartbeat settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Cadence of the aggregate reporting loop.
    pub interval_minutes: u32,

    /// Cadence of the per-target probe loop.
    pub check_interval_seconds: u32,

    /// Time without a successful probe after which a target is DOWN.
    pub failure_timeout_minutes: u32,

    /// Hard timeout applied to a single probe.
    pub health_timeout_seconds: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            check_interval_seconds: 30,
            failure_timeout_minutes: 3,
            health_timeout_seconds: 10,
        }
    }
}

impl HeartbeatConfig {
    /// Apply an override field by field; unspecified fields keep `self`'s value.
    pub fn overlay(&self, layer: &HeartbeatOverride) -> Self {
        Self {
            interval_minutes: layer.interval_minutes.unwrap_or(self.interval_minutes),
            check_interval_seconds: layer
                .check_interval_seconds
                .unwrap_or(self.check_interval_seconds),
            failure_timeout_minutes: layer
                .failure_timeout_minutes
                .unwrap_or(self.failure_timeout_minutes),
            health_timeout_seconds: layer
                .health_timeout_seconds
                .unwrap_or(self.health_timeout_seconds),
        }
    }

    /// Apply an optional `health_monitoring` block.
    pub fn overlay_block(&self, block: Option<&HealthMonitoringBlock>) -> Self {
        match block.and_then(|b| b.heartbeat_config.as_ref()) {
            Some(layer) => self.overlay(layer),
            None => *self,
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_seconds))
    }

    pub fn failure_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.failure_timeout_minutes) * 60)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.health_timeout_seconds))
    }
}

/// Partial heartbeat settings declared at one level of the topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval_seconds: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_timeout_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_timeout_seconds: Option<u32>,

    /// Keys this crate does not interpret (e.g. heartbeat e-mail senders).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The `health_monitoring` object found at the root, project and environment levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMonitoringBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_config: Option<HeartbeatOverride>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl HealthMonitoringBlock {
    pub fn new(layer: HeartbeatOverride) -> Self {
        Self {
            heartbeat_config: Some(layer),
            extra: BTreeMap::new(),
        }
    }
}
