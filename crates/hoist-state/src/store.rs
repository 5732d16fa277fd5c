//! Versioned, copy-on-write topology store.
//!
//! The current [`Snapshot`] lives behind a `watch` channel that acts as an
//! atomic pointer: readers clone the `Arc` and keep a consistent view for as
//! long as they hold it, while writers build a complete new snapshot and swap
//! it in. Writers are serialized among themselves only; readers never wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoist_types::{Job, JobsFile, ResolvedTopology, Topology};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::error::{StateError, StateResult, ValidationWarning};
use crate::validate::{validate, Validated};

/// Immutable view of the configuration at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Incremented on every successful update, starting at 1.
    pub version: u64,
    pub topology: Topology,
    pub resolved: ResolvedTopology,
    pub jobs: Vec<Job>,
    pub warnings: Vec<ValidationWarning>,
}

impl Snapshot {
    fn build(version: u64, topology: Topology, jobs: Vec<Job>) -> StateResult<Self> {
        let Validated { resolved, warnings } = validate(&topology, &jobs)?;
        Ok(Self {
            version,
            topology,
            resolved,
            jobs,
            warnings,
        })
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Owner of the current snapshot and its on-disk form.
#[derive(Debug)]
pub struct ConfigStore {
    topology_path: Option<PathBuf>,
    current: watch::Sender<Arc<Snapshot>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Load and validate the topology and (optionally) the jobs file.
    #[instrument(skip_all, fields(topology = %topology_path.display()))]
    pub async fn load(topology_path: &Path, jobs_path: Option<&Path>) -> StateResult<Self> {
        let topology = read_topology(topology_path).await?;
        let jobs = match jobs_path {
            Some(path) => read_jobs(path).await?,
            None => Vec::new(),
        };

        let snapshot = Snapshot::build(1, topology, jobs)?;
        for warning in &snapshot.warnings {
            warn!(%warning, "Configuration warning");
        }
        info!(
            droplets = snapshot.resolved.droplets.len(),
            environments = snapshot.resolved.environments.len(),
            jobs = snapshot.jobs.len(),
            "Configuration loaded"
        );

        Ok(Self::with_snapshot(Some(topology_path.to_path_buf()), snapshot))
    }

    /// Build a store that is never written to disk.
    pub fn from_parts(topology: Topology, jobs: Vec<Job>) -> StateResult<Self> {
        let snapshot = Snapshot::build(1, topology, jobs)?;
        Ok(Self::with_snapshot(None, snapshot))
    }

    fn with_snapshot(topology_path: Option<PathBuf>, snapshot: Snapshot) -> Self {
        let (current, _) = watch::channel(Arc::new(snapshot));
        Self {
            topology_path,
            current,
            write_lock: Mutex::new(()),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }

    pub fn topology_path(&self) -> Option<&Path> {
        self.topology_path.as_deref()
    }

    /// Apply `mutate` to a copy of the current topology and publish the result.
    ///
    /// The new topology is validated and persisted before it becomes visible.
    /// On any failure the current snapshot is left in place. When `mutate`
    /// leaves the topology unchanged nothing is written or published.
    pub async fn update<F, R>(&self, mutate: F) -> StateResult<(Arc<Snapshot>, R)>
    where
        F: FnOnce(&mut Topology) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let base = self.snapshot();

        let mut topology = base.topology.clone();
        let output = mutate(&mut topology);
        if topology == base.topology {
            return Ok((base, output));
        }

        let next = Snapshot::build(base.version + 1, topology, base.jobs.clone())?;
        if let Some(path) = &self.topology_path {
            persist(path, &next.topology).await?;
        }

        let next = Arc::new(next);
        self.current.send_replace(next.clone());
        debug!(version = next.version, "Snapshot published");
        Ok((next, output))
    }
}

async fn read_topology(path: &Path) -> StateResult<Topology> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read a jobs file in YAML (or JSON, which YAML accepts).
pub async fn read_jobs(path: &Path) -> StateResult<Vec<Job>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str::<JobsFile>(&raw)
        .map(JobsFile::into_jobs)
        .map_err(|e| StateError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Write-new-then-rename, so readers of the file never see a partial write.
async fn persist(path: &Path, topology: &Topology) -> StateResult<()> {
    let persist_err = |reason: String| StateError::Persist {
        path: path.to_path_buf(),
        reason,
    };

    let mut bytes = serde_json::to_vec_pretty(topology).map_err(|e| persist_err(e.to_string()))?;
    bytes.push(b'\n');

    let target = path.to_path_buf();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| persist_err(e.to_string()))?
    .map_err(|e| persist_err(e.to_string()))
}
