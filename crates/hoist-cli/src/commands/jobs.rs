//! `hoist jobs`

use chrono::Utc;
use hoist_types::{CronSchedule, Job};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::error::CliResult;
use crate::output::{display_option, print_output};

#[derive(Tabled, Serialize)]
struct JobRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ENABLED")]
    enabled: bool,
    #[tabled(rename = "SCHEDULE")]
    schedule: String,
    #[tabled(rename = "NEXT RUN (UTC)", display_with = "display_option")]
    next_run: Option<String>,
    #[tabled(rename = "SCRIPT")]
    script: String,
    #[tabled(rename = "DESCRIPTION")]
    description: String,
}

impl JobRow {
    fn new(job: &Job) -> Self {
        let next_run = job
            .enabled
            .then(|| CronSchedule::parse(&job.schedule).ok())
            .flatten()
            .and_then(|schedule| schedule.next_after(Utc::now()))
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string());

        Self {
            name: job.name.clone(),
            enabled: job.enabled,
            schedule: job.schedule.clone(),
            next_run,
            script: job.script_path.clone(),
            description: job.description.clone(),
        }
    }
}

pub async fn execute(ctx: &Context) -> CliResult<()> {
    let store = ctx.load_store().await?;
    let rows: Vec<JobRow> = store.snapshot().jobs.iter().map(JobRow::new).collect();
    print_output(rows, ctx.format)
}
