//! Drives autorouter runs against materialized samples.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::client::AutorouterService;
use super::registry::AutorouterRegistry;
use super::state::{AutorouterRun, RunState, RunTransitions};
use super::validation::validate_routed_result;
use crate::circuit::CircuitGraph;
use crate::error::AutorouterError;
use crate::sample::UNROUTED_CIRCUIT_FILE;
use crate::storage::{routed_file_path, ArtifactRef, ArtifactStore, FsArtifactStore};

/// Outcome of one `(sample_id, autorouter_id)` run.
#[derive(Debug)]
pub struct RunReport {
    pub run: AutorouterRun,
    /// The routed artifact, set iff the run succeeded.
    pub artifact: Option<ArtifactRef>,
    /// Why the run failed, set iff the run failed.
    pub error: Option<AutorouterError>,
    pub duration: Duration,
}

impl RunReport {
    pub fn sample_id(&self) -> &str {
        &self.run.sample_id
    }

    pub fn autorouter_id(&self) -> &str {
        &self.run.autorouter_id
    }

    pub fn state(&self) -> RunState {
        self.run.state()
    }

    pub fn succeeded(&self) -> bool {
        self.run.state() == RunState::Succeeded
    }

    /// Converts the report into the routed artifact or the failure reason.
    pub fn into_result(self) -> Result<ArtifactRef, AutorouterError> {
        match (self.artifact, self.error) {
            (Some(artifact), None) => Ok(artifact),
            (_, Some(error)) => Err(error),
            (None, None) => Err(AutorouterError::InvalidTransition {
                from: self.run.state().to_string(),
                to: RunState::Succeeded.to_string(),
            }),
        }
    }
}

/// Runs autorouters and writes their results through an [`ArtifactStore`].
///
/// Runs are never retried here; a failed run is reported and re-running it
/// is up to the caller.
pub struct AutorouterOrchestrator {
    registry: AutorouterRegistry,
    service: Arc<dyn AutorouterService>,
    transitions: RunTransitions,
}

impl AutorouterOrchestrator {
    pub fn new(registry: AutorouterRegistry, service: Arc<dyn AutorouterService>) -> Self {
        Self {
            registry,
            service,
            transitions: RunTransitions::new(),
        }
    }

    pub fn registry(&self) -> &AutorouterRegistry {
        &self.registry
    }

    /// Routes the unrouted circuit of `sample_id` held in `store`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAutorouter` before any I/O if `autorouter_id` is not
    /// registered. Every later failure is reported in the returned
    /// [`RunReport`] with state `Failed`.
    pub async fn run_for_sample(
        &self,
        store: &dyn ArtifactStore,
        sample_id: &str,
        autorouter_id: &str,
    ) -> Result<RunReport, AutorouterError> {
        self.registry.get(autorouter_id)?;

        let mut run = AutorouterRun::new(sample_id, autorouter_id);
        let started = Instant::now();
        run.transition(&self.transitions, RunState::Running)?;
        info!(sample_id, autorouter = autorouter_id, "Autorouter run started");

        let outcome = async {
            let text = store.read(sample_id, UNROUTED_CIRCUIT_FILE).await?;
            let input = CircuitGraph::from_json_str(&text).map_err(|e| {
                AutorouterError::InvalidInput {
                    path: crate::storage::artifact_key(sample_id, UNROUTED_CIRCUIT_FILE),
                    reason: e.to_string(),
                }
            })?;
            self.route_and_store(store, sample_id, autorouter_id, &input)
                .await
        }
        .await;

        self.finish(run, outcome, started)
    }

    /// Routes the circuit file at `input_path`.
    ///
    /// The file's directory is the sample scope: the result is written to
    /// `<dir>/outputs/<autorouter_id>_routed_circuit.json`, creating
    /// `outputs/` if needed.
    pub async fn run_on_file(
        &self,
        input_path: &Path,
        autorouter_id: &str,
    ) -> Result<RunReport, AutorouterError> {
        self.registry.get(autorouter_id)?;
        let (root, sample_id) = sample_scope(input_path).await?;
        let store = FsArtifactStore::new(root);

        let mut run = AutorouterRun::new(sample_id.clone(), autorouter_id);
        let started = Instant::now();
        run.transition(&self.transitions, RunState::Running)?;
        info!(
            input = %input_path.display(),
            autorouter = autorouter_id,
            "Autorouter run started"
        );

        let outcome = async {
            let text = tokio::fs::read_to_string(input_path).await.map_err(|e| {
                AutorouterError::InvalidInput {
                    path: input_path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            let input = CircuitGraph::from_json_str(&text).map_err(|e| {
                AutorouterError::InvalidInput {
                    path: input_path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            self.route_and_store(&store, &sample_id, autorouter_id, &input)
                .await
        }
        .await;

        self.finish(run, outcome, started)
    }

    /// Best-effort pass over every `(sample, autorouter)` pair.
    ///
    /// All autorouter ids are checked up front; after that a failing pair
    /// never stops the others.
    pub async fn route_all(
        &self,
        store: &dyn ArtifactStore,
        sample_ids: &[String],
        autorouter_ids: &[String],
    ) -> Result<Vec<RunReport>, AutorouterError> {
        for id in autorouter_ids {
            self.registry.get(id)?;
        }

        let mut reports = Vec::with_capacity(sample_ids.len() * autorouter_ids.len());
        for sample_id in sample_ids {
            for autorouter_id in autorouter_ids {
                reports.push(self.run_for_sample(store, sample_id, autorouter_id).await?);
            }
        }

        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        info!(
            runs = reports.len(),
            succeeded,
            failed = reports.len() - succeeded,
            "Routing pass complete"
        );
        Ok(reports)
    }

    async fn route_and_store(
        &self,
        store: &dyn ArtifactStore,
        sample_id: &str,
        autorouter_id: &str,
        input: &CircuitGraph,
    ) -> Result<ArtifactRef, AutorouterError> {
        let response = self.service.solve(autorouter_id, input).await?;
        let routed = validate_routed_result(response)?;

        let content = routed
            .to_json_pretty()
            .map_err(|e| AutorouterError::Storage(e.into()))?;
        let artifact = store
            .materialize(sample_id, &routed_file_path(autorouter_id), &content)
            .await?;
        Ok(artifact)
    }

    fn finish(
        &self,
        mut run: AutorouterRun,
        outcome: Result<ArtifactRef, AutorouterError>,
        started: Instant,
    ) -> Result<RunReport, AutorouterError> {
        let duration = started.elapsed();
        match outcome {
            Ok(artifact) => {
                run.transition(&self.transitions, RunState::Succeeded)?;
                info!(
                    sample_id = %run.sample_id,
                    autorouter = %run.autorouter_id,
                    file_path = %artifact.file_path,
                    duration_ms = duration.as_millis() as u64,
                    "Autorouter run succeeded"
                );
                Ok(RunReport {
                    run,
                    artifact: Some(artifact),
                    error: None,
                    duration,
                })
            }
            Err(error) => {
                run.fail(&self.transitions, error.to_string())?;
                warn!(
                    sample_id = %run.sample_id,
                    autorouter = %run.autorouter_id,
                    error = %error,
                    "Autorouter run failed"
                );
                Ok(RunReport {
                    run,
                    artifact: None,
                    error: Some(error),
                    duration,
                })
            }
        }
    }
}

/// Splits an input file path into `(store_root, sample_id)`.
async fn sample_scope(input_path: &Path) -> Result<(PathBuf, String), AutorouterError> {
    let invalid = |reason: String| AutorouterError::InvalidInput {
        path: input_path.display().to_string(),
        reason,
    };

    let absolute = tokio::fs::canonicalize(input_path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let sample_dir = absolute
        .parent()
        .ok_or_else(|| invalid("input has no parent directory".to_string()))?;
    let root = sample_dir
        .parent()
        .ok_or_else(|| invalid("sample directory has no parent".to_string()))?;
    let sample_id = sample_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| invalid("sample directory has no name".to_string()))?;

    Ok((root.to_path_buf(), sample_id))
}
