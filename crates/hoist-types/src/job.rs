//! Scheduled job definitions and their runtime record.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A job as declared in `jobs.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique across the whole configuration.
    pub name: String,

    /// Five-field cron expression, evaluated in UTC.
    pub schedule: String,

    pub script_path: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Extra environment passed to the script.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Absent means the run is never timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        script_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            script_path: script_path.into(),
            args: Vec::new(),
            description: String::new(),
            enabled: true,
            env_vars: BTreeMap::new(),
            working_dir: None,
            timeout_seconds: None,
        }
    }
}

/// Accepted shapes of the jobs file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobsFile {
    Wrapped { jobs: Vec<Job> },
    List(Vec<Job>),
}

impl JobsFile {
    pub fn into_jobs(self) -> Vec<Job> {
        match self {
            JobsFile::Wrapped { jobs } | JobsFile::List(jobs) => jobs,
        }
    }
}

/// Result of a single fire of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
    TimedOut {
        after_secs: u64,
    },
    /// Fire time reached while the previous run was still in flight.
    SkippedOverlap,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Succeeded => write!(f, "succeeded"),
            JobOutcome::Failed {
                exit_code: Some(code),
                ..
            } => write!(f, "failed (exit {code})"),
            JobOutcome::Failed { message, .. } => write!(f, "failed ({message})"),
            JobOutcome::TimedOut { after_secs } => write!(f, "timed out after {after_secs}s"),
            JobOutcome::SkippedOverlap => write!(f, "skipped - overlap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
}

/// Runtime state of one job. Owned by the scheduler, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunState {
    pub job_name: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_status: Option<JobOutcome>,
    pub currently_running: bool,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub skip_count: u64,
    /// Most recent outcomes, newest last.
    pub history: VecDeque<JobRunRecord>,
}

impl JobRunState {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            last_run_at: None,
            last_finished_at: None,
            last_status: None,
            currently_running: false,
            next_fire_at: None,
            run_count: 0,
            skip_count: 0,
            history: VecDeque::new(),
        }
    }

    /// Mark a run as started.
    pub fn begin(&mut self, started_at: DateTime<Utc>) {
        self.currently_running = true;
        self.last_run_at = Some(started_at);
        self.run_count += 1;
    }

    /// Record the outcome of the run started by [`JobRunState::begin`].
    pub fn finish(
        &mut self,
        scheduled_for: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcome: JobOutcome,
        history_limit: usize,
    ) {
        self.currently_running = false;
        self.last_finished_at = Some(finished_at);
        self.last_status = Some(outcome.clone());
        self.push(
            JobRunRecord {
                scheduled_for,
                started_at: self.last_run_at,
                finished_at,
                outcome,
            },
            history_limit,
        );
    }

    /// Record a tick that was skipped because a run was still in flight.
    pub fn record_skip(&mut self, scheduled_for: DateTime<Utc>, history_limit: usize) {
        self.skip_count += 1;
        self.last_status = Some(JobOutcome::SkippedOverlap);
        self.push(
            JobRunRecord {
                scheduled_for,
                started_at: None,
                finished_at: scheduled_for,
                outcome: JobOutcome::SkippedOverlap,
            },
            history_limit,
        );
    }

    fn push(&mut self, record: JobRunRecord, history_limit: usize) {
        self.history.push_back(record);
        while self.history.len() > history_limit.max(1) {
            self.history.pop_front();
        }
    }
}
