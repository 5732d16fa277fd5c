//! `hoist summary`

use colored::*;
use hoist_state::ValidationWarning;
use hoist_types::DropletId;
use serde::Serialize;

use super::Context;
use crate::error::CliResult;
use crate::output::{print_document, print_warning};

#[derive(Debug, Serialize)]
struct TopologySummary {
    version: u64,
    droplets: usize,
    projects: usize,
    environments: usize,
    services: usize,
    jobs: usize,
    enabled_jobs: usize,
    master: Option<String>,
    unprovisioned: Vec<DropletId>,
    warnings: Vec<ValidationWarning>,
}

pub async fn execute(ctx: &Context) -> CliResult<()> {
    let store = ctx.load_store().await?;
    let snapshot = store.snapshot();
    let resolved = &snapshot.resolved;

    let summary = TopologySummary {
        version: snapshot.version,
        droplets: resolved.droplets.len(),
        projects: snapshot.topology.projects.len(),
        environments: resolved.environments.len(),
        services: resolved.service_count(),
        jobs: snapshot.jobs.len(),
        enabled_jobs: snapshot.jobs.iter().filter(|j| j.enabled).count(),
        master: resolved.master().and_then(|m| m.ip.clone()),
        unprovisioned: resolved.unprovisioned().map(|d| d.id.clone()).collect(),
        warnings: snapshot.warnings.clone(),
    };

    if print_document(&summary, ctx.format)? {
        return Ok(());
    }

    println!("{}", "Topology Summary".bold());
    println!("----------------");
    println!("Droplets:     {}", summary.droplets);
    println!("Projects:     {}", summary.projects);
    println!("Environments: {}", summary.environments);
    println!("Services:     {}", summary.services);
    println!("Jobs:         {} ({} enabled)", summary.jobs, summary.enabled_jobs);
    println!(
        "Master:       {}",
        summary
            .master
            .as_deref()
            .map_or_else(|| "not provisioned".yellow(), |ip| ip.green())
    );
    if summary.unprovisioned.is_empty() {
        println!("Unprovisioned: {}", "none".green());
    } else {
        let ids: Vec<&str> = summary.unprovisioned.iter().map(DropletId::as_str).collect();
        println!("Unprovisioned: {}", ids.join(", ").yellow());
    }
    for warning in &summary.warnings {
        print_warning(&warning.to_string());
    }
    Ok(())
}
