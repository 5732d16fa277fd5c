//! Job execution seam.
//!
//! The scheduler hands each run to a [`JobExecutor`]. [`ProcessExecutor`]
//! launches the job's script as a child process, optionally through an
//! interpreter, and maps its exit status onto [`JobExecutionError`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoist_health::FleetHealthSummary;
use hoist_types::{Job, JobOutcome};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ExecutorConfig;
use crate::error::JobExecutionError;

/// Environment variable carrying the job name.
pub const JOB_NAME_ENV: &str = "HOIST_JOB_NAME";

/// Environment variable carrying the fleet health summary as JSON.
pub const HEALTH_SUMMARY_ENV: &str = "HOIST_HEALTH_SUMMARY";

const STDERR_TAIL_CHARS: usize = 512;

/// What a run gets to see besides its own definition.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub scheduled_for: DateTime<Utc>,
    pub health: FleetHealthSummary,
}

impl JobContext {
    pub fn new(scheduled_for: DateTime<Utc>, health: FleetHealthSummary) -> Self {
        Self {
            scheduled_for,
            health,
        }
    }
}

/// External collaborator that runs one job to completion.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job, context: &JobContext) -> Result<(), JobExecutionError>;
}

/// Map an execution result onto the outcome recorded in run state.
pub fn outcome_of(result: &Result<(), JobExecutionError>) -> JobOutcome {
    match result {
        Ok(()) => JobOutcome::Succeeded,
        Err(JobExecutionError::TimedOut { after_secs, .. }) => JobOutcome::TimedOut {
            after_secs: *after_secs,
        },
        Err(JobExecutionError::NonZeroExit { code, .. }) => JobOutcome::Failed {
            exit_code: *code,
            message: result_message(result),
        },
        Err(JobExecutionError::Launch { .. }) => JobOutcome::Failed {
            exit_code: None,
            message: result_message(result),
        },
    }
}

fn result_message(result: &Result<(), JobExecutionError>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    }
}

/// Runs jobs as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    interpreter: Option<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    fn command(&self, job: &Job, context: &JobContext) -> Command {
        let cwd = job
            .working_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone());

        // Relative script paths are resolved against the job's directory.
        let script = match &cwd {
            Some(dir) if Path::new(&job.script_path).is_relative() => dir.join(&job.script_path),
            _ => PathBuf::from(&job.script_path),
        };

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&script);
                command
            }
            None => Command::new(&script),
        };

        command
            .args(&job.args)
            .envs(&job.env_vars)
            .env(JOB_NAME_ENV, &job.name)
            .env(
                HEALTH_SUMMARY_ENV,
                serde_json::to_string(&context.health).unwrap_or_default(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    #[instrument(skip(self, job, context), fields(job = %job.name))]
    async fn execute(&self, job: &Job, context: &JobContext) -> Result<(), JobExecutionError> {
        let mut command = self.command(job, context);
        debug!(script = %job.script_path, args = ?job.args, "Launching job");

        let run = command.output();
        let output = match job.timeout_seconds {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(JobExecutionError::TimedOut {
                        job: job.name.clone(),
                        after_secs: secs,
                    })
                }
            },
            None => run.await,
        }
        .map_err(|e| JobExecutionError::Launch {
            job: job.name.clone(),
            reason: e.to_string(),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(JobExecutionError::NonZeroExit {
            job: job.name.clone(),
            code: output.status.code(),
            stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
        })
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
