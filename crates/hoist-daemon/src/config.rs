//! Configuration for hoist-daemon

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Input file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Port allocation range
    #[serde(default)]
    pub ports: PortsConfig,

    /// Cloud provisioning API
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Scheduler and reconciliation cadence
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Job process launching
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_topology_path")]
    pub topology: PathBuf,

    #[serde(default = "default_jobs_path")]
    pub jobs: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            topology: default_topology_path(),
            jobs: default_jobs_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsConfig {
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_range_size")]
    pub range_size: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
            range_size: default_range_size(),
        }
    }
}

/// Cloud provisioning API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL; droplets are created with `POST {endpoint}/droplets`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Image requested for new droplets
    #[serde(default = "default_image")]
    pub image: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            image: default_image(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Periodic reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Job executions running at once, across all jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,

    /// Provisioning calls in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_provisioning: usize,

    /// Run records kept per job
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            max_concurrent_jobs: default_max_concurrent(),
            max_concurrent_provisioning: default_max_concurrent(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Program the script is passed to (e.g. `python3`); scripts run directly when unset
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Working directory for jobs that do not set their own
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_topology_path() -> PathBuf {
    PathBuf::from("target.json")
}

fn default_jobs_path() -> PathBuf {
    PathBuf::from("jobs.yaml")
}

fn default_base_port() -> u16 {
    8000
}

fn default_range_size() -> u16 {
    2000
}

fn default_image() -> String {
    "ubuntu-22-04-x64".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    4
}

fn default_history_limit() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: built-in defaults, then the optional file, then
    /// `HOIST_<SECTION>__<KEY>` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HOIST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
