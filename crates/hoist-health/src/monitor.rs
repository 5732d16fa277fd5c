//! Heartbeat monitor.
//!
//! Runs two nested loops: one tight probe loop per `(droplet, service)` pair
//! at `check_interval_seconds`, and one coarser reporting loop per
//! environment at `interval_minutes`. Every probe is bounded by
//! `health_timeout_seconds`; running out of time is a miss, never an error.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hoist_types::{HealthState, ResolvedTopology};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::{HealthError, HealthResult};
use crate::probes::{Probe, ProbeResult};
use crate::summary::{FleetHealthSummary, StateCounts, TargetHealth};
use crate::target::{probe_targets, ProbeTarget, TargetId};
use crate::tracker::{HealthTracker, Transition};

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Events emitted by the health monitor.
#[derive(Debug, Clone)]
pub enum HealthEvent {
    TargetAdded(TargetId),

    TargetRemoved(TargetId),

    ProbeCompleted { target: TargetId, success: bool },

    StateChanged {
        target: TargetId,
        from: HealthState,
        to: HealthState,
    },

    /// Periodic per-environment report.
    Report {
        environment: String,
        counts: StateCounts,
    },
}

struct Monitored {
    target: ProbeTarget,
    tracker: HealthTracker,
}

/// Health monitor for the probe-able part of the topology.
pub struct HealthMonitor {
    probe: Arc<dyn Probe>,

    targets: DashMap<TargetId, Monitored>,

    probe_tasks: DashMap<TargetId, JoinHandle<()>>,

    /// Reporting loops keyed by `project/environment`, with their period.
    reporters: DashMap<String, (Duration, JoinHandle<()>)>,

    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            probe,
            targets: DashMap::new(),
            probe_tasks: DashMap::new(),
            reporters: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to health events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Register a target without starting its probe loop.
    pub fn add_target(&self, target: ProbeTarget) -> HealthResult<()> {
        if self.targets.contains_key(&target.id) {
            return Err(HealthError::MonitorAlreadyRunning(target.id));
        }

        debug!(
            probe_target = %target.id,
            addr = %target.socket_addr(),
            "Registering heartbeat target"
        );
        let id = target.id.clone();
        let tracker = HealthTracker::new(Utc::now(), target.heartbeat.failure_timeout());
        self.targets.insert(id.clone(), Monitored { target, tracker });
        let _ = self.event_tx.send(HealthEvent::TargetAdded(id));
        Ok(())
    }

    /// Register a target and spawn its probe loop.
    pub fn start_target(self: &Arc<Self>, target: ProbeTarget) -> HealthResult<()> {
        let id = target.id.clone();
        let every = target.heartbeat.check_interval().max(MIN_PERIOD);
        self.add_target(target)?;
        let handle = spawn_probe_loop(Arc::downgrade(self), id.clone(), every);
        self.probe_tasks.insert(id, handle);
        Ok(())
    }

    /// Stop probing a target and forget its state.
    pub fn remove_target(&self, id: &TargetId) -> HealthResult<()> {
        if self.targets.remove(id).is_none() {
            return Err(HealthError::TargetNotFound(id.clone()));
        }
        if let Some((_, handle)) = self.probe_tasks.remove(id) {
            handle.abort();
        }
        debug!(probe_target = %id, "Heartbeat target removed");
        let _ = self.event_tx.send(HealthEvent::TargetRemoved(id.clone()));
        Ok(())
    }

    /// Bring the monitored set in line with a resolved topology.
    ///
    /// New pairs start probing, vanished pairs stop, and pairs whose address,
    /// port or heartbeat settings changed are restarted with fresh state.
    #[instrument(skip_all)]
    pub fn sync_targets(self: &Arc<Self>, resolved: &ResolvedTopology) {
        let desired: BTreeMap<TargetId, ProbeTarget> = probe_targets(resolved)
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let stale: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|entry| desired.get(entry.key()) != Some(&entry.value().target))
            .map(|entry| entry.key().clone())
            .collect();
        for id in &stale {
            let _ = self.remove_target(id);
        }

        let mut added = 0usize;
        for (id, target) in desired {
            if self.targets.contains_key(&id) {
                continue;
            }
            if self.start_target(target).is_ok() {
                added += 1;
            }
        }

        self.sync_reporters(resolved);

        if added > 0 || !stale.is_empty() {
            info!(
                added,
                removed = stale.len(),
                total = self.targets.len(),
                "Heartbeat targets updated"
            );
        }
    }

    fn sync_reporters(self: &Arc<Self>, resolved: &ResolvedTopology) {
        let desired: BTreeMap<String, Duration> = resolved
            .environments
            .iter()
            .map(|env| {
                (
                    format!("{}/{}", env.project, env.name),
                    env.heartbeat.report_interval().max(MIN_PERIOD),
                )
            })
            .collect();

        let stale: Vec<String> = self
            .reporters
            .iter()
            .filter(|entry| desired.get(entry.key()) != Some(&entry.value().0))
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            if let Some((_, (_, handle))) = self.reporters.remove(&key) {
                handle.abort();
            }
        }

        for (key, every) in desired {
            if self.reporters.contains_key(&key) {
                continue;
            }
            let handle = spawn_reporter(Arc::downgrade(self), key.clone(), every);
            self.reporters.insert(key, (every, handle));
        }
    }

    /// Probe a target once, bounded by its heartbeat timeout, and record it.
    pub async fn check(&self, id: &TargetId) -> HealthResult<HealthState> {
        let target = self
            .targets
            .get(id)
            .map(|m| m.target.clone())
            .ok_or_else(|| HealthError::TargetNotFound(id.clone()))?;

        let timeout = target.heartbeat.health_timeout();
        let outcome = match tokio::time::timeout(timeout, self.probe.execute(&target)).await {
            Ok(Ok(result)) if result.success => Ok(result),
            Ok(Ok(result)) => Err(HealthError::ProbeFailed {
                target: id.clone(),
                reason: result.message.unwrap_or_default(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HealthError::ProbeTimeout {
                target: id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        self.record(id, outcome, Utc::now())
    }

    /// Feed one probe outcome into the target's state machine.
    pub fn record(
        &self,
        id: &TargetId,
        outcome: HealthResult<ProbeResult>,
        at: DateTime<Utc>,
    ) -> HealthResult<HealthState> {
        let mut monitored = self
            .targets
            .get_mut(id)
            .ok_or_else(|| HealthError::TargetNotFound(id.clone()))?;

        let success = outcome.is_ok();
        let transition = match &outcome {
            Ok(_) => monitored.tracker.record_success(at),
            Err(e) => {
                debug!(
                    probe_target = %id,
                    probe = self.probe.name(),
                    error = %e,
                    "Heartbeat miss"
                );
                monitored.tracker.record_miss(at)
            }
        };
        let state = monitored.tracker.state();
        drop(monitored);

        let _ = self.event_tx.send(HealthEvent::ProbeCompleted {
            target: id.clone(),
            success,
        });

        if let Some(Transition { from, to }) = transition {
            if to.is_healthy() {
                info!(probe_target = %id, from = %from, to = %to, "Health state changed");
            } else {
                warn!(probe_target = %id, from = %from, to = %to, "Health state changed");
            }
            let _ = self.event_tx.send(HealthEvent::StateChanged {
                target: id.clone(),
                from,
                to,
            });
        }

        Ok(state)
    }

    pub fn state(&self, id: &TargetId) -> Option<HealthState> {
        self.targets.get(id).map(|m| m.tracker.state())
    }

    pub fn target_ids(&self) -> HashSet<TargetId> {
        self.targets.iter().map(|e| e.key().clone()).collect()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn summary(&self) -> FleetHealthSummary {
        let targets = self
            .targets
            .iter()
            .map(|entry| TargetHealth {
                target: entry.key().clone(),
                state: entry.tracker.state(),
                last_success: entry.tracker.last_success(),
                consecutive_misses: entry.tracker.consecutive_misses(),
            })
            .collect();
        FleetHealthSummary::from_targets(targets, Utc::now())
    }

    /// Cancel every probe and reporting loop. Recorded state is kept.
    pub fn shutdown(&self) {
        let probes: Vec<TargetId> = self.probe_tasks.iter().map(|e| e.key().clone()).collect();
        for id in probes {
            if let Some((_, handle)) = self.probe_tasks.remove(&id) {
                handle.abort();
            }
        }

        let reporters: Vec<String> = self.reporters.iter().map(|e| e.key().clone()).collect();
        for key in reporters {
            if let Some((_, (_, handle))) = self.reporters.remove(&key) {
                handle.abort();
            }
        }
        info!(targets = self.targets.len(), "Health monitor stopped");
    }

    fn report(&self, environment: &str) {
        let counts = self
            .summary()
            .environments
            .get(environment)
            .copied()
            .unwrap_or_default();
        info!(
            environment = %environment,
            total = counts.total,
            healthy = counts.healthy,
            degraded = counts.degraded,
            down = counts.down,
            unknown = counts.unknown,
            "Heartbeat report"
        );
        let _ = self.event_tx.send(HealthEvent::Report {
            environment: environment.to_string(),
            counts,
        });
    }
}

fn spawn_probe_loop(monitor: Weak<HealthMonitor>, id: TargetId, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(monitor) = monitor.upgrade() else { break };
            if let Err(HealthError::TargetNotFound(_)) = monitor.check(&id).await {
                break;
            }
        }
    })
}

fn spawn_reporter(
    monitor: Weak<HealthMonitor>,
    environment: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; report only after a full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(monitor) = monitor.upgrade() else { break };
            monitor.report(&environment);
        }
    })
}
