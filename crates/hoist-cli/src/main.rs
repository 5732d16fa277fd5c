//! Hoist CLI - declarative droplet topology and job scheduling
//!
//! This CLI gives operators a terminal interface to:
//! - Validate `target.json` and the jobs file
//! - Allocate service ports and provision missing droplets
//! - Run the scheduler with heartbeat monitoring
//! - Inspect jobs and the topology, and run a job on demand

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hoist_daemon::DaemonConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use commands::Context;
use error::{CliError, CliResult};
use output::{print_error, OutputFormat};

/// Hoist CLI application
#[derive(Parser)]
#[command(name = "hoist")]
#[command(
    about = "Hoist - declarative droplet topology reconciler and job scheduler",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "HOIST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Topology file (overrides `paths.topology`)
    #[arg(short, long, global = true)]
    topology: Option<PathBuf>,

    /// Jobs file (overrides `paths.jobs`)
    #[arg(short, long, global = true)]
    jobs: Option<PathBuf>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table", global = true)]
    output: OutputFormat,

    /// Log level (overrides `logging.level`; `RUST_LOG` wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    log_json: bool,

    /// Cloud provisioning API base URL
    #[arg(long, env = "HOIST_PROVIDER_ENDPOINT", global = true)]
    provider_endpoint: Option<String>,

    /// Cloud provisioning API token
    #[arg(long, env = "HOIST_PROVIDER_TOKEN", hide_env_values = true, global = true)]
    provider_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Check the topology and jobs for structural errors
    Validate {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Allocate ports and provision droplets without an address
    Apply {
        /// Print the plan without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the scheduler, health monitor and periodic reconciliation
    RunScheduler,

    /// Assign ports to web services that lack one
    Ports,

    /// List jobs and their next run
    Jobs,

    /// Run a job now, regardless of its schedule
    RunJob {
        /// Job name
        name: String,
    },

    /// Show topology counts, master address and warnings
    Summary,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(topology) = cli.topology {
        config.paths.topology = topology;
    }
    let jobs_explicit = cli.jobs.is_some();
    if let Some(jobs) = cli.jobs {
        config.paths.jobs = jobs;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if let Some(endpoint) = cli.provider_endpoint {
        config.provider.endpoint = Some(endpoint);
    }
    if let Some(token) = cli.provider_token {
        config.provider.token = Some(token);
    }

    init_tracing(&config);

    let ctx = Context {
        config,
        format: cli.output,
        jobs_explicit,
    };

    match cli.command {
        Commands::Validate { strict } => commands::validate::execute(&ctx, strict).await,
        Commands::Apply { dry_run } => commands::apply::execute(&ctx, dry_run).await,
        Commands::RunScheduler => commands::scheduler::execute(&ctx).await,
        Commands::Ports => commands::ports::execute(&ctx).await,
        Commands::Jobs => commands::jobs::execute(&ctx).await,
        Commands::RunJob { name } => commands::run_job::execute(&ctx, &name).await,
        Commands::Summary => commands::summary::execute(&ctx).await,
    }
}

fn init_tracing(config: &DaemonConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    // Logs go to stderr so table/json/yaml output stays clean on stdout.
    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hoist",
            "validate",
            "--strict",
            "--topology",
            "t.json",
            "-o",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Validate { strict: true }));
        assert_eq!(cli.topology, Some(PathBuf::from("t.json")));
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_run_job_requires_name() {
        assert!(Cli::try_parse_from(["hoist", "run-job"]).is_err());
    }
}
