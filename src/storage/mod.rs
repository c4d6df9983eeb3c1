//! Artifact persistence.
//!
//! Every sample artifact is addressed by `(sample_id, file_path)` and stored
//! as text. Two backends implement [`ArtifactStore`]:
//!
//! - [`FsArtifactStore`]: one directory per sample, atomic replace on write
//! - [`SqliteArtifactStore`]: `samples` and `sample_files` tables with
//!   upsert-by-key semantics
//!
//! A store instance covers a single dataset. The filesystem store is rooted
//! at the dataset directory; the SQLite store is scoped with
//! [`SqliteArtifactStore::for_dataset`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use circuit_forge::storage::{ArtifactStore, FsArtifactStore, sample_id};
//!
//! let store = FsArtifactStore::new("./datasets/dataset-1");
//! let artifact = store
//!     .materialize(&sample_id(1), "unrouted.dsn", "(pcb circuit ...)")
//!     .await?;
//! assert_eq!(artifact.artifact_key, "sample-1-unrouted.dsn");
//! ```

pub mod fs;
pub mod mimetype;
pub mod sqlite;

use std::path::{Component, Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

pub use fs::FsArtifactStore;
pub use mimetype::mimetype_for;
pub use sqlite::SqliteArtifactStore;

/// Sub-scope of a sample that holds routed results.
pub const OUTPUTS_DIR: &str = "outputs";

/// Returns the dataset identifier for dataset number `n`.
pub fn dataset_id(n: u32) -> String {
    format!("dataset-{}", n)
}

/// Returns the sample identifier for sample number `n`.
pub fn sample_id(n: u32) -> String {
    format!("sample-{}", n)
}

/// Returns the flat artifact key for a sample file.
pub fn artifact_key(sample_id: &str, file_path: &str) -> String {
    format!("{}-{}", sample_id, file_path)
}

/// Returns the file path of an autorouter's routed result.
pub fn routed_file_path(autorouter_id: &str) -> String {
    format!("{}/{}_routed_circuit.json", OUTPUTS_DIR, autorouter_id)
}

/// Metadata for one generated sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_id: String,
    pub dataset_id: String,
    pub sample_number: u32,
    /// Template name the sample was evaluated from.
    pub template: String,
    pub created_at: DateTime<Utc>,
}

impl SampleRecord {
    pub fn new(dataset_id: impl Into<String>, sample_number: u32, template: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id(sample_number),
            dataset_id: dataset_id.into(),
            sample_number,
            template: template.into(),
            created_at: Utc::now(),
        }
    }
}

/// Reference to a materialized artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_key: String,
    pub sample_id: String,
    pub file_path: String,
    pub mimetype: String,
    pub size_bytes: u64,
    /// SHA-256 of the content, hex encoded.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRef {
    /// Validates the key and describes `content` without writing anything.
    ///
    /// Both backends call this first so a rejected artifact never reaches
    /// the store.
    pub fn describe(sample_id: &str, file_path: &str, content: &str) -> Result<Self, StorageError> {
        validate_sample_id(sample_id)?;
        validate_file_path(file_path)?;
        let mimetype = mimetype_for(file_path)?;

        Ok(Self {
            artifact_key: artifact_key(sample_id, file_path),
            sample_id: sample_id.to_string(),
            file_path: file_path.to_string(),
            mimetype: mimetype.to_string(),
            size_bytes: content.len() as u64,
            checksum: compute_checksum(content.as_bytes()),
            created_at: Utc::now(),
        })
    }
}

/// Persists sample artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Inserts or replaces the metadata of a sample.
    async fn record_sample(&self, sample: &SampleRecord) -> Result<(), StorageError>;

    /// Writes `content` under `(sample_id, file_path)`, replacing any prior
    /// content for that key.
    ///
    /// # Errors
    ///
    /// Fails with `StorageError::UnknownMimetype` for extensions outside
    /// `.json`, `.svg` and `.dsn`, and `StorageError::InvalidPath` for
    /// absolute paths or paths escaping the sample scope. Nothing is written
    /// in either case.
    async fn materialize(
        &self,
        sample_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<ArtifactRef, StorageError>;

    /// Reads back the content stored under `(sample_id, file_path)`.
    async fn read(&self, sample_id: &str, file_path: &str) -> Result<String, StorageError>;

    /// Lists a sample's artifacts ordered by file path.
    async fn list_artifacts(&self, sample_id: &str) -> Result<Vec<ArtifactRef>, StorageError>;

    /// Lists recorded samples ordered by dataset and sample number.
    async fn list_samples(&self) -> Result<Vec<SampleRecord>, StorageError>;

    /// Dataset this store is restricted to, if it tracks one.
    fn dataset_scope(&self) -> Option<&str> {
        None
    }
}

/// Computes the hex-encoded SHA-256 of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Rejects empty, absolute or parent-escaping file paths.
pub fn validate_file_path(file_path: &str) -> Result<(), StorageError> {
    let path = Path::new(file_path);
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(file_path.to_string()));
            }
        }
    }
    if normal == 0 || file_path.contains('\\') {
        return Err(StorageError::InvalidPath(file_path.to_string()));
    }
    Ok(())
}

/// Sample identifiers name a single directory, so they must be one plain
/// path component.
pub fn validate_sample_id(sample_id: &str) -> Result<(), StorageError> {
    let mut components = Path::new(sample_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !sample_id.contains('\\') => Ok(()),
        _ => Err(StorageError::InvalidPath(sample_id.to_string())),
    }
}
