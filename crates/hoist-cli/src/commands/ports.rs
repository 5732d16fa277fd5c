//! `hoist ports`: port allocation only

use hoist_daemon::allocate_ports;

use super::apply::port_rows;
use super::Context;
use crate::error::CliResult;
use crate::output::{print_output, print_success, OutputFormat};

pub async fn execute(ctx: &Context) -> CliResult<()> {
    let store = ctx.load_store().await?;
    let assigned = allocate_ports(&store, &ctx.allocator()).await?;

    if assigned.is_empty() && ctx.format == OutputFormat::Table {
        print_success("Every web service already has a port");
        return Ok(());
    }
    print_output(port_rows(&assigned), ctx.format)
}
