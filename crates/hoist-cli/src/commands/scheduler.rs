//! `hoist run-scheduler`: the long-lived loop

use std::sync::Arc;

use hoist_daemon::{shutdown_signal, Runtime, RuntimeParts};

use super::Context;
use crate::error::CliResult;

pub async fn execute(ctx: &Context) -> CliResult<()> {
    let store = Arc::new(ctx.load_store().await?);
    let parts = RuntimeParts::from_config(&ctx.config)?;
    let runtime = Runtime::new(&ctx.config, store, parts)?;

    runtime.run_until(shutdown_signal()).await?;
    Ok(())
}
