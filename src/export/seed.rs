//! Seed database fixture for the web tier's tests.
//!
//! Produces the JSON document the registry API loads as its initial state:
//! two datasets, the registry autorouters and three `keyboard` samples of
//! `dataset-1` with their unrouted files.

use std::path::Path;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::autorouter::AutorouterRegistry;
use crate::error::{DatasetError, StorageError};
use crate::evaluator::TemplateRef;
use crate::sample::{SampleProducer, SampleRange};
use crate::storage::{artifact_key, mimetype_for, sample_id};

/// Number of samples seeded for the keyboard dataset.
pub const SEED_SAMPLE_COUNT: u32 = 3;

const SEED_DATASET_ID: &str = "dataset-1";
const SEED_ACCOUNT_ID: &str = "test-account-id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDataset {
    pub dataset_id: String,
    pub dataset_name_with_owner: String,
    pub dataset_name: String,
    pub owner_name: String,
    pub sample_count: u32,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_md: Option<String>,
    pub registry_account_id: String,
    pub median_trace_count: u32,
    pub max_layer_count: u32,
    pub created_at: String,
    pub star_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedAutorouter {
    pub autorouter_id: String,
    pub autorouter_name: String,
    pub version: String,
    pub description_md: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    pub license_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSample {
    pub sample_id: String,
    pub dataset_id: String,
    pub sample_number: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSampleFile {
    /// `<sample_id>-<file_path>`.
    pub sample_file_id: String,
    pub dataset_id: String,
    pub sample_id: String,
    pub file_path: String,
    pub mimetype: String,
    pub text_content: String,
    pub created_at: String,
}

/// Full seed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDatabase {
    pub id_counter: u64,
    pub datasets: Vec<SeedDataset>,
    pub samples: Vec<SeedSample>,
    pub sample_files: Vec<SeedSampleFile>,
    pub autorouters: Vec<SeedAutorouter>,
    pub autorouter_run_results: Vec<Value>,
}

fn seed_datasets(now: &str) -> Vec<SeedDataset> {
    vec![
        SeedDataset {
            dataset_id: "dataset-1".to_string(),
            dataset_name_with_owner: "testuser/custom-keyboards".to_string(),
            dataset_name: "custom-keyboards".to_string(),
            owner_name: "testuser".to_string(),
            sample_count: SEED_SAMPLE_COUNT,
            version: "1.0.0".to_string(),
            description_md: Some(
                "A dataset of custom keyboards based on [this snippet](https://tscircuit.com/seveibar/keyboard-sample)"
                    .to_string(),
            ),
            registry_account_id: SEED_ACCOUNT_ID.to_string(),
            median_trace_count: 10,
            max_layer_count: 2,
            created_at: now.to_string(),
            star_count: 0,
        },
        SeedDataset {
            dataset_id: "dataset-2".to_string(),
            dataset_name_with_owner: "testuser/blinking-leds".to_string(),
            dataset_name: "blinking-leds".to_string(),
            owner_name: "testuser".to_string(),
            sample_count: SEED_SAMPLE_COUNT,
            version: "2.0.0".to_string(),
            description_md: None,
            registry_account_id: SEED_ACCOUNT_ID.to_string(),
            median_trace_count: 5,
            max_layer_count: 1,
            created_at: now.to_string(),
            star_count: 0,
        },
    ]
}

fn seed_autorouters(registry: &AutorouterRegistry, now: &str) -> Vec<SeedAutorouter> {
    registry
        .iter()
        .map(|d| SeedAutorouter {
            autorouter_id: d.id.clone(),
            autorouter_name: d.name.clone(),
            version: d.version.to_string(),
            description_md: d.description.clone(),
            github_url: d.github_url.clone(),
            website_url: d.website_url.clone(),
            license_type: d.license.clone(),
            created_at: now.to_string(),
        })
        .collect()
}

/// Builds the seed document, evaluating the keyboard samples with `producer`.
pub async fn generate_seed_database(
    producer: &SampleProducer,
    template: &TemplateRef,
    registry: &AutorouterRegistry,
) -> Result<SeedDatabase, DatasetError> {
    let now = Utc::now().to_rfc3339();
    let mut db = SeedDatabase {
        id_counter: 0,
        datasets: seed_datasets(&now),
        samples: Vec::new(),
        sample_files: Vec::new(),
        autorouters: seed_autorouters(registry, &now),
        autorouter_run_results: Vec::new(),
    };

    let range = SampleRange::new(1, SEED_SAMPLE_COUNT)?;
    let mut bundles = Box::pin(producer.produce_samples(template.clone(), range));
    while let Some(bundle) = bundles.next().await {
        let bundle = bundle?;
        let id = sample_id(bundle.sample_number);
        db.samples.push(SeedSample {
            sample_id: id.clone(),
            dataset_id: SEED_DATASET_ID.to_string(),
            sample_number: bundle.sample_number,
            created_at: now.clone(),
        });

        let files = bundle
            .artifacts()
            .map_err(|e| DatasetError::Storage(e.into()))?;
        for (file_path, text_content) in files {
            db.sample_files.push(SeedSampleFile {
                sample_file_id: artifact_key(&id, file_path),
                dataset_id: SEED_DATASET_ID.to_string(),
                sample_id: id.clone(),
                file_path: file_path.to_string(),
                mimetype: mimetype_for(file_path)?.to_string(),
                text_content,
                created_at: now.clone(),
            });
        }
    }

    info!(
        samples = db.samples.len(),
        sample_files = db.sample_files.len(),
        "Seed database generated"
    );
    Ok(db)
}

/// Writes `db` as pretty-printed JSON.
pub async fn write_seed_database(db: &SeedDatabase, path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::DirectoryCreationFailed(format!("{}: {}", parent.display(), e))
            })?;
        }
    }
    let json = serde_json::to_string_pretty(db)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitGraph;
    use crate::convert::fixtures::two_pad_circuit;
    use crate::convert::CircuitConverter;
    use crate::error::EvaluationError;
    use crate::evaluator::Evaluator;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixtureEvaluator;

    #[async_trait]
    impl Evaluator for FixtureEvaluator {
        async fn evaluate(
            &self,
            _template: &TemplateRef,
            _sample_number: u32,
        ) -> Result<CircuitGraph, EvaluationError> {
            Ok(two_pad_circuit())
        }
    }

    fn producer() -> SampleProducer {
        SampleProducer::new(
            Arc::new(FixtureEvaluator),
            Arc::new(CircuitConverter::default()),
        )
    }

    #[tokio::test]
    async fn test_seed_contents() {
        let template = TemplateRef::new("keyboard", "@tsci/seveibar.keyboard-sample");
        let db = generate_seed_database(&producer(), &template, &AutorouterRegistry::builtin())
            .await
            .unwrap();

        let names: Vec<&str> = db
            .datasets
            .iter()
            .map(|d| d.dataset_name_with_owner.as_str())
            .collect();
        assert_eq!(names, vec!["testuser/custom-keyboards", "testuser/blinking-leds"]);

        let routers: Vec<&str> = db.autorouters.iter().map(|a| a.autorouter_id.as_str()).collect();
        assert_eq!(routers, vec!["freerouting", "tscircuit-builtin"]);
        assert_eq!(db.autorouters[0].version, "1.9.0");

        assert_eq!(db.samples.len(), 3);
        assert_eq!(db.sample_files.len(), 12);
        assert_eq!(db.sample_files[0].sample_file_id, "sample-1-unrouted_circuit.json");
        assert_eq!(db.sample_files[0].mimetype, "application/json");
        assert!(db.sample_files[0].text_content.starts_with('['));
        assert!(db.autorouter_run_results.is_empty());
    }

    #[tokio::test]
    async fn test_write_round_trips() {
        let temp = tempfile::TempDir::new().unwrap();
        let template = TemplateRef::new("keyboard", "@tsci/seveibar.keyboard-sample");
        let db = generate_seed_database(&producer(), &template, &AutorouterRegistry::builtin())
            .await
            .unwrap();

        let path = temp.path().join("fixtures/seed-database.generated.json");
        write_seed_database(&db, &path).await.unwrap();

        let loaded: SeedDatabase =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, db);
        assert!(!std::fs::read_to_string(&path)
            .unwrap()
            .contains("\"description_md\": null"));
    }
}
