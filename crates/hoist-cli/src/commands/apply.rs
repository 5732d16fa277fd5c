//! `hoist apply` and `hoist ports`

use std::sync::Arc;

use hoist_daemon::{apply_once, plan, Reconciler, RuntimeParts};
use hoist_state::AssignedPort;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::error::{CliError, CliResult};
use crate::output::{
    print_document, print_error, print_info, print_output, print_success, print_warning,
};

#[derive(Tabled, Serialize)]
pub(crate) struct PortRow {
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "ENVIRONMENT")]
    environment: String,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "PORT")]
    port: u16,
}

impl From<&AssignedPort> for PortRow {
    fn from(assigned: &AssignedPort) -> Self {
        Self {
            project: assigned.service.project.clone(),
            environment: assigned.service.environment.clone(),
            service: assigned.service.service.clone(),
            port: assigned.port,
        }
    }
}

pub(crate) fn port_rows(ports: &[AssignedPort]) -> Vec<PortRow> {
    ports.iter().map(PortRow::from).collect()
}

pub async fn execute(ctx: &Context, dry_run: bool) -> CliResult<()> {
    let store = Arc::new(ctx.load_store().await?);
    let allocator = ctx.allocator();

    if dry_run {
        let plan = plan(&store, &allocator)?;
        if print_document(&plan, ctx.format)? {
            return Ok(());
        }
        if plan.is_empty() {
            print_success("Nothing to do");
            return Ok(());
        }
        if !plan.ports.is_empty() {
            print_info("Ports that would be assigned:");
            print_output(port_rows(&plan.ports), ctx.format)?;
        }
        for droplet in &plan.provision {
            print_info(&format!("Would provision droplet {droplet}"));
        }
        return Ok(());
    }

    let parts = RuntimeParts::from_config(&ctx.config)?;
    let reconciler = Reconciler::new(
        store.clone(),
        parts.provisioner,
        ctx.config.scheduler.max_concurrent_provisioning,
        ctx.config.provider.image.clone(),
    );
    let report = apply_once(&store, &allocator, &reconciler).await?;

    if !print_document(&report, ctx.format)? {
        if !report.ports.is_empty() {
            print_output(port_rows(&report.ports), ctx.format)?;
        }
        for droplet in &report.reconcile.conflicts {
            print_warning(&format!(
                "Droplet {droplet} is referenced by several projects; first owner recorded"
            ));
        }
        for (droplet, ip) in &report.reconcile.provisioned {
            print_success(&format!("Provisioned {droplet} at {ip}"));
        }
        for (droplet, reason) in &report.reconcile.failed {
            print_error(&format!("Could not provision {droplet}: {reason}"));
        }
        if report.is_clean() {
            print_success(&format!(
                "Applied (version {})",
                store.snapshot().version
            ));
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Unprovisioned(report.reconcile.failed.len()))
    }
}
