//! Filesystem artifact store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   sample-1/
//!     sample.json
//!     unrouted_circuit.json
//!     unrouted.dsn
//!     unrouted_pcb.svg
//!     unrouted_simple_route.json
//!     outputs/
//!       freerouting_routed_circuit.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use super::{
    artifact_key, compute_checksum, mimetype, validate_file_path, validate_sample_id,
    ArtifactRef, ArtifactStore, SampleRecord,
};
use crate::error::StorageError;

/// Per-sample metadata file.
pub const SAMPLE_METADATA_FILE: &str = "sample.json";

/// Stores artifacts as plain files, one directory per sample.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a sample's files.
    pub fn sample_dir(&self, sample_id: &str) -> PathBuf {
        self.root.join(sample_id)
    }

    /// Absolute location of an artifact.
    pub fn artifact_path(&self, sample_id: &str, file_path: &str) -> PathBuf {
        self.sample_dir(sample_id).join(file_path)
    }

    async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir).await.map_err(|e| {
            StorageError::DirectoryCreationFailed(format!("{}: {}", dir.display(), e))
        })
    }

    /// Writes `data` next to `target` and renames it into place, so readers
    /// see either the old or the new content.
    async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), StorageError> {
        let dir = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(target.display().to_string()))?;
        Self::ensure_dir(dir).await?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, target).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    async fn describe_existing(
        &self,
        sample_id: &str,
        file_path: &str,
        path: &Path,
    ) -> Result<ArtifactRef, StorageError> {
        let data = fs::read(path).await?;
        let modified = fs::metadata(path).await?.modified()?;
        Ok(ArtifactRef {
            artifact_key: artifact_key(sample_id, file_path),
            sample_id: sample_id.to_string(),
            file_path: file_path.to_string(),
            mimetype: mimetype::mimetype_for(file_path)?.to_string(),
            size_bytes: data.len() as u64,
            checksum: compute_checksum(&data),
            created_at: DateTime::<Utc>::from(modified),
        })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn record_sample(&self, sample: &SampleRecord) -> Result<(), StorageError> {
        validate_sample_id(&sample.sample_id)?;
        let data = serde_json::to_vec_pretty(sample)?;
        let path = self.sample_dir(&sample.sample_id).join(SAMPLE_METADATA_FILE);
        Self::write_atomic(&path, &data).await?;
        debug!(sample_id = %sample.sample_id, path = %path.display(), "Sample recorded");
        Ok(())
    }

    async fn materialize(
        &self,
        sample_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<ArtifactRef, StorageError> {
        let artifact = ArtifactRef::describe(sample_id, file_path, content)?;
        if file_path == SAMPLE_METADATA_FILE {
            return Err(StorageError::InvalidPath(file_path.to_string()));
        }

        let path = self.artifact_path(sample_id, file_path);
        Self::write_atomic(&path, content.as_bytes()).await?;
        debug!(
            sample_id,
            file_path,
            size_bytes = artifact.size_bytes,
            "Artifact materialized"
        );
        Ok(artifact)
    }

    async fn read(&self, sample_id: &str, file_path: &str) -> Result<String, StorageError> {
        validate_sample_id(sample_id)?;
        validate_file_path(file_path)?;
        let path = self.artifact_path(sample_id, file_path);
        fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(artifact_key(sample_id, file_path))
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn list_artifacts(&self, sample_id: &str) -> Result<Vec<ArtifactRef>, StorageError> {
        validate_sample_id(sample_id)?;
        let dir = self.sample_dir(sample_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&dir) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || relative == SAMPLE_METADATA_FILE || !mimetype::is_known(&relative) {
                continue;
            }
            found.push((relative, entry.into_path()));
        }

        let mut artifacts = Vec::with_capacity(found.len());
        for (relative, path) in found {
            artifacts.push(self.describe_existing(sample_id, &relative, &path).await?);
        }
        artifacts.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(artifacts)
    }

    async fn list_samples(&self) -> Result<Vec<SampleRecord>, StorageError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut samples = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata_path = entry.path().join(SAMPLE_METADATA_FILE);
            match fs::read(&metadata_path).await {
                Ok(data) => samples.push(serde_json::from_slice::<SampleRecord>(&data)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        samples.sort_by(|a, b| {
            (a.dataset_id.as_str(), a.sample_number).cmp(&(b.dataset_id.as_str(), b.sample_number))
        });
        Ok(samples)
    }
}
