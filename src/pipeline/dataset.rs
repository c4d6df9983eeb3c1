//! Dataset runs: produce, persist and optionally route every sample.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::autorouter::{AutorouterOrchestrator, RunReport};
use crate::error::{AutorouterError, DatasetError, StorageError};
use crate::evaluator::TemplateRef;
use crate::sample::{SampleBundle, SampleProducer, SampleRange};
use crate::storage::{ArtifactStore, SampleRecord};

/// Cooperative cancellation signal, checked between samples.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a dataset run ended without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    Completed,
    /// Stopped between samples; completed samples stay persisted.
    Cancelled,
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetStatus::Completed => write!(f, "completed"),
            DatasetStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Summary of a dataset run.
#[derive(Debug)]
pub struct DatasetReport {
    pub dataset_id: String,
    pub status: DatasetStatus,
    pub samples_completed: usize,
    /// Samples persisted without a preview.
    pub samples_degraded: usize,
    /// One report per inline `(sample, autorouter)` run.
    pub routing: Vec<RunReport>,
    pub duration: Duration,
}

impl DatasetReport {
    pub fn routing_failures(&self) -> usize {
        self.routing.iter().filter(|r| !r.succeeded()).count()
    }
}

/// Drives a [`SampleProducer`] over a range and persists each sample as soon
/// as it is produced.
pub struct DatasetRunner {
    producer: SampleProducer,
    store: Arc<dyn ArtifactStore>,
    concurrency: usize,
    autorouter: Option<Arc<AutorouterOrchestrator>>,
    autorouter_ids: Vec<String>,
}

impl DatasetRunner {
    pub fn new(producer: SampleProducer, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            producer,
            store,
            concurrency: 1,
            autorouter: None,
            autorouter_ids: Vec::new(),
        }
    }

    /// Evaluates up to `n` samples at once. Persistence stays in sample order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Routes each sample right after it is persisted.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAutorouter` if any id is not registered.
    pub fn with_autorouting(
        mut self,
        orchestrator: Arc<AutorouterOrchestrator>,
        autorouter_ids: Vec<String>,
    ) -> Result<Self, AutorouterError> {
        for id in &autorouter_ids {
            orchestrator.registry().get(id)?;
        }
        self.autorouter = Some(orchestrator);
        self.autorouter_ids = autorouter_ids;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Runs the dataset.
    ///
    /// Any sample failure fails the whole run with `DatasetError::Failed`;
    /// samples persisted before it are left in place. Routing failures are
    /// reported in [`DatasetReport::routing`] and never fail the run.
    pub async fn run(
        &self,
        dataset_id: &str,
        template: &TemplateRef,
        range: SampleRange,
        cancel: &CancelFlag,
    ) -> Result<DatasetReport, DatasetError> {
        let started = Instant::now();
        info!(
            dataset_id,
            template = %template.name,
            range = %range,
            concurrency = self.concurrency,
            "Dataset run started"
        );

        if let Some(scope) = self.store.dataset_scope() {
            if scope != dataset_id {
                return Err(DatasetError::Storage(StorageError::DatasetMismatch {
                    expected: scope.to_string(),
                    found: dataset_id.to_string(),
                }));
            }
        }

        let mut bundles: std::pin::Pin<Box<dyn Stream<Item = Result<SampleBundle, DatasetError>> + Send>> =
            if self.concurrency > 1 {
                Box::pin(
                    self.producer
                        .produce_concurrent(template.clone(), range, self.concurrency),
                )
            } else {
                Box::pin(self.producer.produce_samples(template.clone(), range))
            };

        let mut samples_completed = 0usize;
        let mut samples_degraded = 0usize;
        let mut routing = Vec::new();
        let mut status = DatasetStatus::Completed;

        loop {
            if cancel.is_cancelled() {
                info!(dataset_id, samples_completed, "Dataset run cancelled");
                status = DatasetStatus::Cancelled;
                break;
            }

            let bundle = match bundles.next().await {
                Some(Ok(bundle)) => bundle,
                Some(Err(e)) => {
                    let sample_number = e
                        .sample_number()
                        .unwrap_or(range.start() + samples_completed as u32);
                    return Err(self.fail(dataset_id, sample_number, samples_completed, e));
                }
                None => break,
            };

            let sample_number = bundle.sample_number;
            if let Err(e) = self.persist(dataset_id, template, &bundle).await {
                return Err(self.fail(dataset_id, sample_number, samples_completed, e));
            }
            samples_completed += 1;
            if bundle.is_degraded() {
                samples_degraded += 1;
            }

            if let Some(orchestrator) = &self.autorouter {
                let sample_id = crate::storage::sample_id(sample_number);
                for autorouter_id in &self.autorouter_ids {
                    match orchestrator
                        .run_for_sample(self.store.as_ref(), &sample_id, autorouter_id)
                        .await
                    {
                        Ok(report) => routing.push(report),
                        Err(e) => warn!(
                            dataset_id,
                            sample_id = %sample_id,
                            autorouter = %autorouter_id,
                            error = %e,
                            "Inline autorouting skipped"
                        ),
                    }
                }
            }
        }

        let report = DatasetReport {
            dataset_id: dataset_id.to_string(),
            status,
            samples_completed,
            samples_degraded,
            routing,
            duration: started.elapsed(),
        };
        info!(
            dataset_id,
            status = %report.status,
            samples_completed = report.samples_completed,
            samples_degraded = report.samples_degraded,
            routing_failures = report.routing_failures(),
            duration_ms = report.duration.as_millis() as u64,
            "Dataset run finished"
        );
        Ok(report)
    }

    async fn persist(
        &self,
        dataset_id: &str,
        template: &TemplateRef,
        bundle: &SampleBundle,
    ) -> Result<(), DatasetError> {
        let record = SampleRecord::new(dataset_id, bundle.sample_number, template.name.clone());
        let artifacts = bundle
            .artifacts()
            .map_err(|e| DatasetError::Storage(e.into()))?;
        for (file_path, content) in &artifacts {
            self.store
                .materialize(&record.sample_id, file_path, content)
                .await?;
        }
        // Listed samples always have their full artifact set.
        self.store.record_sample(&record).await?;
        info!(
            dataset_id,
            sample_id = %record.sample_id,
            sample_number = bundle.sample_number,
            artifacts = artifacts.len(),
            "Sample persisted"
        );
        Ok(())
    }

    fn fail(
        &self,
        dataset_id: &str,
        sample_number: u32,
        samples_completed: usize,
        source: DatasetError,
    ) -> DatasetError {
        warn!(
            dataset_id,
            sample_number,
            samples_completed,
            error = %source,
            "Dataset run failed"
        );
        DatasetError::Failed {
            dataset_id: dataset_id.to_string(),
            sample_number,
            samples_completed,
            source: Box::new(source),
        }
    }
}
