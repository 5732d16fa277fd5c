//! Cron-driven job scheduler.
//!
//! One coordinating loop computes fire times and dispatches runs onto a
//! bounded pool of tasks. A job whose previous run is still in flight when
//! its next fire time arrives is skipped for that tick, never queued. Run
//! outcomes are recorded and never move the schedule. Missed fire times are
//! not backfilled: after a tick the next fire time is computed from "now".

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hoist_health::{FleetHealthSummary, HealthMonitor};
use hoist_types::{CronSchedule, Job, JobOutcome, JobRunState};
use serde::Serialize;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::executor::{outcome_of, JobContext, JobExecutor};

/// Upper bound on a single sleep of the coordinating loop.
const MAX_WAIT: Duration = Duration::from_secs(30);

struct ScheduledJob {
    job: Job,
    schedule: CronSchedule,
}

/// Jobs acted on by one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Scheduler {
    /// Enabled jobs only.
    jobs: BTreeMap<String, ScheduledJob>,
    states: DashMap<String, JobRunState>,
    executor: Arc<dyn JobExecutor>,
    clock: Arc<dyn Clock>,
    health: Option<Arc<HealthMonitor>>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    history_limit: usize,
}

impl Scheduler {
    /// Build a scheduler for the enabled subset of `jobs`.
    pub fn new(
        jobs: &[Job],
        executor: Arc<dyn JobExecutor>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> DaemonResult<Self> {
        let now = clock.now();
        let states = DashMap::new();
        let mut scheduled = BTreeMap::new();

        for job in jobs.iter().filter(|j| j.enabled) {
            let schedule = CronSchedule::parse(&job.schedule)
                .map_err(|e| DaemonError::Scheduler(format!("job {}: {e}", job.name)))?;

            let mut state = JobRunState::new(&job.name);
            state.next_fire_at = schedule.next_after(now);
            states.insert(job.name.clone(), state);
            scheduled.insert(
                job.name.clone(),
                ScheduledJob {
                    job: job.clone(),
                    schedule,
                },
            );
        }

        let disabled = jobs.len() - scheduled.len();
        info!(enabled = scheduled.len(), disabled, "Scheduler initialized");

        Ok(Self {
            jobs: scheduled,
            states,
            executor,
            clock,
            health: None,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            history_limit: config.history_limit,
        })
    }

    /// Hand the monitor's summary to every dispatched run.
    pub fn with_health(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.health = Some(monitor);
        self
    }

    pub fn state(&self, name: &str) -> Option<JobRunState> {
        self.states.get(name).map(|s| s.clone())
    }

    /// Run state of every scheduled job, by name.
    pub fn states(&self) -> Vec<JobRunState> {
        let mut states: Vec<_> = self.states.iter().map(|s| s.clone()).collect();
        states.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        states
    }

    /// Earliest pending fire time across all jobs.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.states.iter().filter_map(|s| s.next_fire_at).min()
    }

    /// Fire every job whose next fire time is at or before `now`.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let mut dispatch = Vec::new();

        for (name, scheduled) in &self.jobs {
            let Some(mut state) = self.states.get_mut(name) else {
                continue;
            };
            let Some(due) = state.next_fire_at.filter(|due| *due <= now) else {
                continue;
            };

            if state.currently_running {
                state.record_skip(due, self.history_limit);
                warn!(
                    job = %name,
                    scheduled_for = %due,
                    "Previous run still in flight; tick skipped"
                );
                report.skipped.push(name.clone());
            } else {
                state.begin(now);
                dispatch.push((name.clone(), due));
                report.dispatched.push(name.clone());
            }
            state.next_fire_at = scheduled.schedule.next_after(now);
        }

        let mut tasks = self.tasks.lock().await;
        for (name, scheduled_for) in dispatch {
            let this = Arc::clone(self);
            tasks.spawn(async move { this.run_job(name, scheduled_for).await });
        }
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Job task ended abnormally");
            }
        }

        if !report.dispatched.is_empty() || !report.skipped.is_empty() {
            debug!(dispatched = ?report.dispatched, skipped = ?report.skipped, "Tick processed");
        }
        report
    }

    #[instrument(skip_all, fields(job = %name))]
    async fn run_job(self: Arc<Self>, name: String, scheduled_for: DateTime<Utc>) {
        let Some(scheduled) = self.jobs.get(&name) else {
            return;
        };

        let outcome = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                let context = JobContext::new(scheduled_for, self.health_summary());
                info!(scheduled_for = %scheduled_for, "Job started");
                let result = self.executor.execute(&scheduled.job, &context).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Job failed");
                }
                outcome_of(&result)
            }
            Err(e) => JobOutcome::Failed {
                exit_code: None,
                message: e.to_string(),
            },
        };

        if outcome.is_success() {
            info!("Job succeeded");
        }
        if let Some(mut state) = self.states.get_mut(&name) {
            state.finish(scheduled_for, self.clock.now(), outcome, self.history_limit);
        }
    }

    fn health_summary(&self) -> FleetHealthSummary {
        self.health
            .as_ref()
            .map(|monitor| monitor.summary())
            .unwrap_or_else(FleetHealthSummary::empty)
    }

    /// Wait for every dispatched run to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for running jobs");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task ended abnormally");
            }
        }
    }

    /// Coordinating loop. Returns once `shutdown` turns true and every
    /// in-flight run has finished.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.jobs.len(), "Scheduler loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            self.tick(now).await;

            let wait = self
                .next_due()
                .map(|due| (due - self.clock.now()).to_std().unwrap_or(Duration::ZERO))
                .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopping; no new dispatches");
        self.drain().await;
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::error::JobExecutionError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeExecutor {
        runs: std::sync::Mutex<Vec<(String, DateTime<Utc>)>>,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl FakeExecutor {
        fn runs(&self) -> Vec<(String, DateTime<Utc>)> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobExecutor for FakeExecutor {
        async fn execute(&self, job: &Job, context: &JobContext) -> Result<(), JobExecutionError> {
            self.runs
                .lock()
                .unwrap()
                .push((job.name.clone(), context.scheduled_for));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(JobExecutionError::NonZeroExit {
                    job: job.name.clone(),
                    code: Some(1),
                    stderr: String::new(),
                });
            }
            Ok(())
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn scheduler(jobs: Vec<Job>, executor: Arc<FakeExecutor>) -> Arc<Scheduler> {
        let clock = Arc::new(ManualClock::at(at(12, 0, 30)));
        Arc::new(Scheduler::new(&jobs, executor, clock, &SchedulerConfig::default()).unwrap())
    }

    fn every_minute(name: &str) -> Job {
        Job::new(name, "*/1 * * * *", format!("scripts/{name}.py"))
    }

    #[tokio::test]
    async fn test_first_fire_time_is_primed() {
        let scheduler = scheduler(vec![every_minute("tick")], Arc::new(FakeExecutor::default()));
        assert_eq!(scheduler.state("tick").unwrap().next_fire_at, Some(at(12, 1, 0)));
        assert_eq!(scheduler.next_due(), Some(at(12, 1, 0)));

        let report = scheduler.tick(at(12, 0, 59)).await;
        assert!(report.dispatched.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_job_never_runs() {
        let executor = Arc::new(FakeExecutor::default());
        let mut job = every_minute("off");
        job.enabled = false;
        let scheduler = scheduler(vec![job], executor.clone());

        for minute in 1..10 {
            scheduler.tick(at(12, minute, 0)).await;
        }
        scheduler.drain().await;

        assert!(executor.runs().is_empty());
        assert!(scheduler.state("off").is_none());
        assert!(scheduler.states().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let gate = Arc::new(Notify::new());
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let scheduler = scheduler(vec![every_minute("slow")], executor.clone());

        let first = scheduler.tick(at(12, 1, 0)).await;
        assert_eq!(first.dispatched, vec!["slow".to_string()]);

        let second = scheduler.tick(at(12, 2, 0)).await;
        assert!(second.dispatched.is_empty());
        assert_eq!(second.skipped, vec!["slow".to_string()]);

        let state = scheduler.state("slow").unwrap();
        assert!(state.currently_running);
        assert_eq!(state.skip_count, 1);
        assert_eq!(state.last_status, Some(JobOutcome::SkippedOverlap));
        assert_eq!(state.next_fire_at, Some(at(12, 3, 0)));

        gate.notify_one();
        scheduler.drain().await;

        let state = scheduler.state("slow").unwrap();
        assert!(!state.currently_running);
        assert_eq!(state.run_count, 1);
        assert_eq!(state.last_status, Some(JobOutcome::Succeeded));
        assert_eq!(state.history.len(), 2);
        assert_eq!(executor.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_cadence() {
        let executor = Arc::new(FakeExecutor {
            fail: true,
            ..Default::default()
        });
        let scheduler = scheduler(vec![every_minute("flaky")], executor.clone());

        scheduler.tick(at(12, 1, 0)).await;
        scheduler.drain().await;

        let state = scheduler.state("flaky").unwrap();
        assert!(matches!(
            state.last_status,
            Some(JobOutcome::Failed {
                exit_code: Some(1),
                ..
            })
        ));
        assert_eq!(state.next_fire_at, Some(at(12, 2, 0)));

        let report = scheduler.tick(at(12, 2, 0)).await;
        assert_eq!(report.dispatched, vec!["flaky".to_string()]);
        scheduler.drain().await;
        assert_eq!(executor.runs().len(), 2);
    }

    #[tokio::test]
    async fn test_missed_fire_times_are_not_backfilled() {
        let executor = Arc::new(FakeExecutor::default());
        let scheduler = scheduler(vec![every_minute("late")], executor.clone());

        let report = scheduler.tick(at(12, 5, 30)).await;
        assert_eq!(report.dispatched.len(), 1);
        scheduler.drain().await;

        assert_eq!(executor.runs(), vec![("late".to_string(), at(12, 1, 0))]);
        assert_eq!(scheduler.state("late").unwrap().next_fire_at, Some(at(12, 6, 0)));
    }

    #[tokio::test]
    async fn test_independent_jobs_run_in_parallel() {
        let gate = Arc::new(Notify::new());
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let scheduler = scheduler(vec![every_minute("a"), every_minute("b")], executor.clone());

        let report = scheduler.tick(at(12, 1, 0)).await;
        assert_eq!(report.dispatched, vec!["a".to_string(), "b".to_string()]);

        while executor.runs().len() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_waiters();
        scheduler.drain().await;
        assert!(scheduler.states().iter().all(|s| s.last_status == Some(JobOutcome::Succeeded)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_job() {
        let gate = Arc::new(Notify::new());
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let scheduler = scheduler(vec![every_minute("long")], executor.clone());
        scheduler.tick(at(12, 1, 0)).await;

        let (tx, rx) = watch::channel(false);
        let loop_handle = tokio::spawn(scheduler.clone().run(rx));
        tx.send(true).unwrap();

        tokio::task::yield_now().await;
        assert!(!loop_handle.is_finished());
        assert!(scheduler.state("long").unwrap().currently_running);

        gate.notify_one();
        loop_handle.await.unwrap();
        assert!(!scheduler.state("long").unwrap().currently_running);
        assert_eq!(executor.runs().len(), 1);
    }
}
