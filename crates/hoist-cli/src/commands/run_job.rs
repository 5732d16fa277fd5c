//! `hoist run-job <name>`: run one job now, outside its schedule

use chrono::Utc;
use hoist_daemon::{outcome_of, JobContext, JobExecutor, ProcessExecutor};
use hoist_health::FleetHealthSummary;
use hoist_types::JobOutcome;
use serde::Serialize;

use super::Context;
use crate::error::{CliError, CliResult};
use crate::output::{print_document, print_success, print_warning, OutputFormat};

#[derive(Serialize)]
struct RunResult {
    job: String,
    outcome: JobOutcome,
}

pub async fn execute(ctx: &Context, name: &str) -> CliResult<()> {
    let store = ctx.load_store().await?;
    let snapshot = store.snapshot();
    let job = snapshot
        .job(name)
        .ok_or_else(|| CliError::JobNotFound(name.to_string()))?;

    if !job.enabled && ctx.format == OutputFormat::Table {
        print_warning(&format!("Job {name} is disabled; running it anyway"));
    }

    let executor = ProcessExecutor::new(&ctx.config.executor);
    let context = JobContext::new(Utc::now(), FleetHealthSummary::empty());
    let result = executor.execute(job, &context).await;
    let outcome = outcome_of(&result);

    let printed = print_document(
        &RunResult {
            job: name.to_string(),
            outcome: outcome.clone(),
        },
        ctx.format,
    )?;

    if outcome.is_success() {
        if !printed {
            print_success(&format!("Job {name} succeeded"));
        }
        Ok(())
    } else {
        Err(CliError::JobFailed {
            name: name.to_string(),
            reason: match result {
                Err(e) => e.to_string(),
                Ok(()) => outcome.to_string(),
            },
        })
    }
}
