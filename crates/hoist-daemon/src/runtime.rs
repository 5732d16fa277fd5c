//! Long-lived runtime behind `hoist run-scheduler`.
//!
//! Wires the store, health monitor, reconciler and scheduler together and
//! owns their lifecycle: startup sync, periodic reconciliation on its own
//! task, and graceful shutdown that stops dispatching, cancels probes and
//! waits for in-flight jobs and provisioning calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hoist_health::{HealthMonitor, Probe, TcpProbe};
use hoist_state::{ConfigStore, PortAllocator, Snapshot};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::apply::apply_once;
use crate::clock::{Clock, SystemClock};
use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::executor::{JobExecutor, ProcessExecutor};
use crate::provisioner::{CloudProvisioner, HttpProvisioner, UnconfiguredProvisioner};
use crate::reconciler::Reconciler;
use crate::scheduler::Scheduler;

/// Collaborators the runtime drives.
pub struct RuntimeParts {
    pub provisioner: Arc<dyn CloudProvisioner>,
    pub executor: Arc<dyn JobExecutor>,
    pub probe: Arc<dyn Probe>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeParts {
    /// Production collaborators for a configuration.
    pub fn from_config(config: &DaemonConfig) -> DaemonResult<Self> {
        let provisioner: Arc<dyn CloudProvisioner> = if config.provider.endpoint.is_some() {
            Arc::new(HttpProvisioner::new(&config.provider)?)
        } else {
            warn!("No provisioning endpoint; droplets without an address stay unprovisioned");
            Arc::new(UnconfiguredProvisioner)
        };

        Ok(Self {
            provisioner,
            executor: Arc::new(ProcessExecutor::new(&config.executor)),
            probe: Arc::new(TcpProbe::new()),
            clock: Arc::new(SystemClock),
        })
    }
}

pub struct Runtime {
    store: Arc<ConfigStore>,
    monitor: Arc<HealthMonitor>,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<Scheduler>,
    allocator: PortAllocator,
    reconcile_every: Duration,
}

impl Runtime {
    pub fn new(
        config: &DaemonConfig,
        store: Arc<ConfigStore>,
        parts: RuntimeParts,
    ) -> DaemonResult<Self> {
        let monitor = Arc::new(HealthMonitor::new(parts.probe));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            parts.provisioner,
            config.scheduler.max_concurrent_provisioning,
            config.provider.image.clone(),
        ));

        let snapshot = store.snapshot();
        let scheduler = Scheduler::new(
            &snapshot.jobs,
            parts.executor,
            parts.clock,
            &config.scheduler,
        )?
        .with_health(monitor.clone());

        Ok(Self {
            store,
            monitor,
            reconciler,
            scheduler: Arc::new(scheduler),
            allocator: PortAllocator::new(config.ports.base_port, config.ports.range_size),
            reconcile_every: Duration::from_secs(config.scheduler.reconcile_interval_secs.max(1)),
        })
    }

    pub fn store(&self) -> Arc<ConfigStore> {
        self.store.clone()
    }

    pub fn monitor(&self) -> Arc<HealthMonitor> {
        self.monitor.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// Run until `shutdown` completes, then stop everything gracefully.
    pub async fn run_until<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let snapshots = self.store.subscribe();
        self.monitor.sync_targets(&self.store.snapshot().resolved);
        info!(
            targets = self.monitor.target_count(),
            reconcile_every_secs = self.reconcile_every.as_secs(),
            "Hoist runtime started"
        );

        let follower = tokio::spawn(follow_store(
            snapshots,
            self.monitor.clone(),
            stop_rx.clone(),
        ));
        let reconcile = tokio::spawn(reconcile_loop(
            self.store.clone(),
            self.allocator,
            self.reconciler.clone(),
            self.reconcile_every,
            stop_rx.clone(),
        ));
        let scheduler = tokio::spawn(self.scheduler.clone().run(stop_rx));

        shutdown.await;
        info!("Shutting down hoist runtime");

        stop_tx.send_replace(true);
        self.monitor.shutdown();

        let tasks = [
            ("scheduler", scheduler),
            ("reconciler", reconcile),
            ("store follower", follower),
        ];
        for (task, handle) in tasks {
            if let Err(e) = handle.await {
                error!(task, error = %e, "Runtime task ended abnormally");
            }
        }

        info!("Hoist runtime stopped");
        Ok(())
    }
}

/// Keep probe targets in line with published snapshots.
async fn follow_store(
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    monitor: Arc<HealthMonitor>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                monitor.sync_targets(&snapshot.resolved);
            }
            _ = stop.changed() => break,
        }
    }
}

/// Periodic apply. A pass that has started always runs to completion.
async fn reconcile_loop(
    store: Arc<ConfigStore>,
    allocator: PortAllocator,
    reconciler: Arc<Reconciler>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        if *stop.borrow() {
            break;
        }

        match apply_once(&store, &allocator, &reconciler).await {
            Ok(report) if !report.is_clean() => {
                warn!(
                    failed = report.reconcile.failed.len(),
                    "Reconcile pass left droplets unprovisioned"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Reconcile pass aborted"),
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
