//! End-to-end tests for dataset generation and routing.
//!
//! The evaluator and the autorouting service are replaced by in-process
//! fakes; everything else (conversion, storage, orchestration) is real.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use circuit_forge::autorouter::{AutorouterOrchestrator, AutorouterRegistry, AutorouterService};
use circuit_forge::circuit::CircuitGraph;
use circuit_forge::convert::CircuitConverter;
use circuit_forge::error::{AutorouterError, DatasetError, EvaluationError, StorageError};
use circuit_forge::evaluator::{Evaluator, TemplateRef};
use circuit_forge::pipeline::{CancelFlag, DatasetRunner, DatasetStatus};
use circuit_forge::sample::{SampleProducer, SampleRange};
use circuit_forge::storage::{ArtifactStore, FsArtifactStore, SqliteArtifactStore};

const UNROUTED_CIRCUIT: &str = include_str!("fixtures/unrouted_circuit.json");

/// Returns the fixture circuit for every sample except those in `fail_on`.
struct FixtureEvaluator {
    fail_on: HashSet<u32>,
}

impl FixtureEvaluator {
    fn healthy() -> Self {
        Self {
            fail_on: HashSet::new(),
        }
    }

    fn failing_on(sample_number: u32) -> Self {
        Self {
            fail_on: HashSet::from([sample_number]),
        }
    }
}

#[async_trait]
impl Evaluator for FixtureEvaluator {
    async fn evaluate(
        &self,
        _template: &TemplateRef,
        sample_number: u32,
    ) -> Result<CircuitGraph, EvaluationError> {
        if self.fail_on.contains(&sample_number) {
            return Err(EvaluationError::Execution {
                code: 1,
                stderr: format!("render of sample {} crashed", sample_number),
            });
        }
        CircuitGraph::from_json_str(UNROUTED_CIRCUIT)
            .map_err(|e| EvaluationError::InvalidOutput(e.to_string()))
    }
}

/// Echoes the input circuit with one trace appended.
struct EchoRouter;

#[async_trait]
impl AutorouterService for EchoRouter {
    async fn solve(
        &self,
        autorouter_id: &str,
        input: &CircuitGraph,
    ) -> Result<Value, AutorouterError> {
        let mut elements = serde_json::to_value(input)
            .map_err(|e| AutorouterError::Service(e.to_string()))?;
        if let Some(array) = elements.as_array_mut() {
            array.push(json!({
                "type": "pcb_trace",
                "pcb_trace_id": format!("{}_trace_0", autorouter_id),
                "route": [
                    {"route_type": "wire", "x": -5.0, "y": 0.0, "width": 0.15, "layer": "top"},
                    {"route_type": "wire", "x": 5.0, "y": 0.0, "width": 0.15, "layer": "top"}
                ]
            }));
        }
        Ok(elements)
    }
}

/// Always answers with an unrouted circuit.
struct NoTraceRouter;

#[async_trait]
impl AutorouterService for NoTraceRouter {
    async fn solve(
        &self,
        _autorouter_id: &str,
        input: &CircuitGraph,
    ) -> Result<Value, AutorouterError> {
        serde_json::to_value(input).map_err(|e| AutorouterError::Service(e.to_string()))
    }
}

fn keyboard() -> TemplateRef {
    TemplateRef::new("keyboard", "@tsci/seveibar.keyboard-sample")
}

fn producer(evaluator: FixtureEvaluator) -> SampleProducer {
    SampleProducer::new(Arc::new(evaluator), Arc::new(CircuitConverter::default()))
}

fn orchestrator(service: impl AutorouterService + 'static) -> Arc<AutorouterOrchestrator> {
    Arc::new(AutorouterOrchestrator::new(
        AutorouterRegistry::builtin(),
        Arc::new(service),
    ))
}

const UNROUTED_FILES: [&str; 4] = [
    "unrouted.dsn",
    "unrouted_circuit.json",
    "unrouted_pcb.svg",
    "unrouted_simple_route.json",
];

#[tokio::test]
async fn test_keyboard_range_materializes_four_files_per_sample() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("dataset-1");
    let store = Arc::new(FsArtifactStore::new(&root));
    let runner = DatasetRunner::new(producer(FixtureEvaluator::healthy()), store.clone());

    let range = SampleRange::parse("1", "3").unwrap();
    let report = runner
        .run("dataset-1", &keyboard(), range, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(report.status, DatasetStatus::Completed);
    assert_eq!(report.samples_completed, 3);
    assert_eq!(report.samples_degraded, 0);

    for n in 1..=3 {
        let sample_id = format!("sample-{}", n);
        for file in UNROUTED_FILES {
            assert!(root.join(&sample_id).join(file).is_file(), "{}/{}", sample_id, file);
        }

        let artifacts = store.list_artifacts(&sample_id).await.unwrap();
        let paths: Vec<&str> = artifacts.iter().map(|a| a.file_path.as_str()).collect();
        assert_eq!(paths, UNROUTED_FILES.to_vec());

        let dsn = artifacts.iter().find(|a| a.file_path == "unrouted.dsn").unwrap();
        assert_eq!(dsn.mimetype, "text/plain");
        assert_eq!(dsn.artifact_key, format!("sample-{}-unrouted.dsn", n));
    }

    let samples = store.list_samples().await.unwrap();
    let numbers: Vec<u32> = samples.iter().map(|s| s.sample_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_stored_circuit_preserves_element_types() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(temp.path()));
    let runner = DatasetRunner::new(producer(FixtureEvaluator::healthy()), store.clone());

    runner
        .run(
            "dataset-1",
            &keyboard(),
            SampleRange::new(1, 1).unwrap(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    let stored = store.read("sample-1", "unrouted_circuit.json").await.unwrap();
    let stored = CircuitGraph::from_json_str(&stored).unwrap();
    let original = CircuitGraph::from_json_str(UNROUTED_CIRCUIT).unwrap();
    assert_eq!(stored.len(), original.len());
    assert_eq!(stored.type_histogram(), original.type_histogram());
}

#[tokio::test]
async fn test_evaluation_failure_keeps_earlier_samples() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("dataset-1");
    let store = Arc::new(FsArtifactStore::new(&root));
    let runner = DatasetRunner::new(producer(FixtureEvaluator::failing_on(2)), store);

    let err = runner
        .run(
            "dataset-1",
            &keyboard(),
            SampleRange::parse("1", "3").unwrap(),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

    match err {
        DatasetError::Failed {
            dataset_id,
            sample_number,
            samples_completed,
            source,
        } => {
            assert_eq!(dataset_id, "dataset-1");
            assert_eq!(sample_number, 2);
            assert_eq!(samples_completed, 1);
            assert!(matches!(*source, DatasetError::Evaluation { .. }));
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    assert!(root.join("sample-1/unrouted_circuit.json").is_file());
    assert!(!root.join("sample-2").exists());
    assert!(!root.join("sample-3").exists());
}

#[test]
fn test_invalid_ranges_are_rejected() {
    assert!(matches!(
        SampleRange::parse("3", "1"),
        Err(DatasetError::InvalidRange(_))
    ));
    assert!(matches!(
        SampleRange::parse("0", "2"),
        Err(DatasetError::InvalidRange(_))
    ));
    assert!(matches!(
        SampleRange::parse("one", "2"),
        Err(DatasetError::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_inline_routing_writes_outputs() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("dataset-1");
    let store = Arc::new(FsArtifactStore::new(&root));
    let runner = DatasetRunner::new(producer(FixtureEvaluator::healthy()), store)
        .with_autorouting(orchestrator(EchoRouter), vec!["freerouting".to_string()])
        .unwrap();

    let report = runner
        .run(
            "dataset-1",
            &keyboard(),
            SampleRange::new(1, 2).unwrap(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.routing.len(), 2);
    assert_eq!(report.routing_failures(), 0);

    let routed = std::fs::read_to_string(
        root.join("sample-2/outputs/freerouting_routed_circuit.json"),
    )
    .unwrap();
    let routed = CircuitGraph::from_json_str(&routed).unwrap();
    assert_eq!(routed.trace_count(), 1);
    assert!(routed.non_trace_count() > 0);
}

#[tokio::test]
async fn test_routing_pass_reports_each_key() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(temp.path()));
    DatasetRunner::new(producer(FixtureEvaluator::healthy()), store.clone())
        .run(
            "dataset-1",
            &keyboard(),
            SampleRange::new(1, 2).unwrap(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    let orchestrator = orchestrator(NoTraceRouter);
    let samples = vec!["sample-1".to_string(), "sample-2".to_string()];
    let routers = vec!["freerouting".to_string(), "tscircuit-builtin".to_string()];
    let reports = orchestrator
        .route_all(store.as_ref(), &samples, &routers)
        .await
        .unwrap();

    assert_eq!(reports.len(), 4);
    for report in &reports {
        assert!(!report.succeeded());
        assert!(matches!(
            report.error,
            Some(AutorouterError::Validation(_))
        ));
    }

    // Failed runs leave the unrouted artifacts alone.
    let artifacts = store.list_artifacts("sample-1").await.unwrap();
    assert_eq!(artifacts.len(), 4);
}

#[tokio::test]
async fn test_run_on_file_creates_outputs_dir() {
    let temp = TempDir::new().unwrap();
    let sample_dir = temp.path().join("sample-1");
    std::fs::create_dir_all(&sample_dir).unwrap();
    let input = sample_dir.join("unrouted_circuit.json");
    std::fs::write(&input, UNROUTED_CIRCUIT).unwrap();

    let report = orchestrator(EchoRouter)
        .run_on_file(&input, "freerouting")
        .await
        .unwrap();
    let artifact = report.into_result().unwrap();

    assert_eq!(artifact.file_path, "outputs/freerouting_routed_circuit.json");
    assert_eq!(artifact.mimetype, "application/json");
    assert!(sample_dir
        .join("outputs/freerouting_routed_circuit.json")
        .is_file());
}

#[tokio::test]
async fn test_sqlite_store_keeps_datasets_apart() {
    let base = SqliteArtifactStore::open_in_memory().await.unwrap();

    for dataset_id in ["dataset-1", "dataset-2"] {
        let store = Arc::new(base.for_dataset(dataset_id));
        let report = DatasetRunner::new(producer(FixtureEvaluator::healthy()), store)
            .with_concurrency(3)
            .run(
                dataset_id,
                &keyboard(),
                SampleRange::new(1, 3).unwrap(),
                &CancelFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.samples_completed, 3);
    }

    let samples = base.list_samples().await.unwrap();
    let datasets: Vec<&str> = samples.iter().map(|s| s.dataset_id.as_str()).collect();
    assert_eq!(
        datasets,
        vec!["dataset-1", "dataset-1", "dataset-1", "dataset-2", "dataset-2", "dataset-2"]
    );

    for dataset_id in ["dataset-1", "dataset-2"] {
        let store = base.for_dataset(dataset_id);
        assert_eq!(store.list_samples().await.unwrap().len(), 3);
        assert_eq!(store.list_artifacts("sample-3").await.unwrap().len(), 4);
    }
}

#[tokio::test]
async fn test_sqlite_store_rejects_foreign_dataset() {
    let base = SqliteArtifactStore::open_in_memory().await.unwrap();
    let store = Arc::new(base.for_dataset("dataset-1"));
    let err = DatasetRunner::new(producer(FixtureEvaluator::healthy()), store)
        .run(
            "dataset-2",
            &keyboard(),
            SampleRange::new(1, 1).unwrap(),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DatasetError::Storage(StorageError::DatasetMismatch { .. })
    ));
    assert!(base.list_samples().await.unwrap().is_empty());
    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sample_files")
        .fetch_one(base.pool())
        .await
        .unwrap();
    assert_eq!(files, 0);
}

#[tokio::test]
async fn test_unknown_mimetype_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path());

    let err = store
        .materialize("sample-1", "unrouted.bin", "binary")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownMimetype(_)));
    assert!(!temp.path().join("sample-1/unrouted.bin").exists());
}
