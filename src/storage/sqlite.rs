//! SQLite-backed artifact store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{validate_file_path, validate_sample_id, ArtifactRef, ArtifactStore, SampleRecord};
use crate::error::StorageError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS samples (
    dataset_id      TEXT    NOT NULL,
    sample_id       TEXT    NOT NULL,
    sample_number   INTEGER NOT NULL,
    template        TEXT    NOT NULL,
    created_at      TEXT    NOT NULL,

    PRIMARY KEY (dataset_id, sample_id)
);

CREATE TABLE IF NOT EXISTS sample_files (
    artifact_key    TEXT    NOT NULL,
    dataset_id      TEXT    NOT NULL,
    sample_id       TEXT    NOT NULL,
    file_path       TEXT    NOT NULL,
    mimetype        TEXT    NOT NULL,
    text_content    TEXT    NOT NULL,
    size_bytes      INTEGER NOT NULL,
    checksum        TEXT    NOT NULL,
    created_at      TEXT    NOT NULL,

    UNIQUE (dataset_id, sample_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_samples_dataset ON samples(dataset_id, sample_number);
CREATE INDEX IF NOT EXISTS idx_sample_files_key ON sample_files(dataset_id, artifact_key);
"#;

/// Stores artifacts as rows keyed by `(dataset_id, sample_id, file_path)`.
///
/// Freshly opened stores are unscoped: they can list every sample but
/// refuse artifact reads and writes until scoped with
/// [`for_dataset`](Self::for_dataset). Scoped handles share the pool.
#[derive(Clone)]
pub struct SqliteArtifactStore {
    pool: SqlitePool,
    dataset_id: Option<String>,
}

impl SqliteArtifactStore {
    /// Opens (creating if missing) the database at `url`.
    ///
    /// Accepts either a `sqlite:` URL or a bare file path.
    pub async fn open(url: &str) -> Result<Self, StorageError> {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        };
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            dataset_id: None,
        };
        store.ensure_schema().await?;
        info!(url = %url, "Artifact database opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// Limited to one connection, since every SQLite in-memory connection
    /// is its own database.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            dataset_id: None,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Handle on the same database restricted to `dataset_id`.
    pub fn for_dataset(&self, dataset_id: impl Into<String>) -> Self {
        Self {
            pool: self.pool.clone(),
            dataset_id: Some(dataset_id.into()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    fn scope(&self) -> Result<&str, StorageError> {
        self.dataset_id.as_deref().ok_or(StorageError::Unscoped)
    }

    fn artifact_from_row(row: &sqlx::sqlite::SqliteRow) -> ArtifactRef {
        ArtifactRef {
            artifact_key: row.get("artifact_key"),
            sample_id: row.get("sample_id"),
            file_path: row.get("file_path"),
            mimetype: row.get("mimetype"),
            size_bytes: row.get::<i64, _>("size_bytes").max(0) as u64,
            checksum: row.get("checksum"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn record_sample(&self, sample: &SampleRecord) -> Result<(), StorageError> {
        validate_sample_id(&sample.sample_id)?;
        let dataset_id = self.scope()?;
        if sample.dataset_id != dataset_id {
            return Err(StorageError::DatasetMismatch {
                expected: dataset_id.to_string(),
                found: sample.dataset_id.clone(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO samples (dataset_id, sample_id, sample_number, template, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(dataset_id, sample_id) DO UPDATE SET
                sample_number = excluded.sample_number,
                template = excluded.template,
                created_at = excluded.created_at
            "#,
        )
        .bind(dataset_id)
        .bind(&sample.sample_id)
        .bind(i64::from(sample.sample_number))
        .bind(&sample.template)
        .bind(sample.created_at)
        .execute(&self.pool)
        .await?;

        debug!(dataset_id, sample_id = %sample.sample_id, "Sample recorded");
        Ok(())
    }

    async fn materialize(
        &self,
        sample_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<ArtifactRef, StorageError> {
        let artifact = ArtifactRef::describe(sample_id, file_path, content)?;
        let dataset_id = self.scope()?;

        sqlx::query(
            r#"
            INSERT INTO sample_files
                (artifact_key, dataset_id, sample_id, file_path, mimetype, text_content, size_bytes, checksum, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(dataset_id, sample_id, file_path) DO UPDATE SET
                artifact_key = excluded.artifact_key,
                mimetype = excluded.mimetype,
                text_content = excluded.text_content,
                size_bytes = excluded.size_bytes,
                checksum = excluded.checksum,
                created_at = excluded.created_at
            "#,
        )
        .bind(&artifact.artifact_key)
        .bind(dataset_id)
        .bind(&artifact.sample_id)
        .bind(&artifact.file_path)
        .bind(&artifact.mimetype)
        .bind(content)
        .bind(artifact.size_bytes as i64)
        .bind(&artifact.checksum)
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await?;

        debug!(
            dataset_id,
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
        let dataset_id = self.scope()?;
        let row = sqlx::query(
            r#"
            SELECT text_content FROM sample_files
            WHERE dataset_id = ?1 AND sample_id = ?2 AND file_path = ?3
            "#,
        )
        .bind(dataset_id)
        .bind(sample_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.get("text_content")),
            None => Err(StorageError::NotFound(format!(
                "{}/{}",
                dataset_id,
                super::artifact_key(sample_id, file_path)
            ))),
        }
    }

    async fn list_artifacts(&self, sample_id: &str) -> Result<Vec<ArtifactRef>, StorageError> {
        let dataset_id = self.scope()?;
        let rows = sqlx::query(
            r#"
            SELECT artifact_key, sample_id, file_path, mimetype, size_bytes, checksum, created_at
            FROM sample_files
            WHERE dataset_id = ?1 AND sample_id = ?2
            ORDER BY file_path
            "#,
        )
        .bind(dataset_id)
        .bind(sample_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::artifact_from_row).collect())
    }

    /// Samples of the scoped dataset, or of every dataset when unscoped.
    async fn list_samples(&self) -> Result<Vec<SampleRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT sample_id, dataset_id, sample_number, template, created_at
            FROM samples
            WHERE ?1 IS NULL OR dataset_id = ?1
            ORDER BY dataset_id, sample_number
            "#,
        )
        .bind(self.dataset_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SampleRecord {
                sample_id: row.get("sample_id"),
                dataset_id: row.get("dataset_id"),
                sample_number: row.get::<i64, _>("sample_number").max(0) as u32,
                template: row.get("template"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    fn dataset_scope(&self) -> Option<&str> {
        self.dataset_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scoped(dataset_id: &str) -> SqliteArtifactStore {
        SqliteArtifactStore::open_in_memory()
            .await
            .unwrap()
            .for_dataset(dataset_id)
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let store = scoped("dataset-1").await;

        store.materialize("sample-1", "unrouted.dsn", "first").await.unwrap();
        store.materialize("sample-1", "unrouted.dsn", "second").await.unwrap();

        assert_eq!(store.read("sample-1", "unrouted.dsn").await.unwrap(), "second");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sample_files")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rows_carry_dataset_artifact_key_and_text_content() {
        let store = scoped("dataset-2").await;
        store
            .materialize("sample-3", "unrouted_pcb.svg", "<svg/>")
            .await
            .unwrap();

        let row = sqlx::query(
            "SELECT artifact_key, dataset_id, mimetype, text_content FROM sample_files",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<String, _>("artifact_key"), "sample-3-unrouted_pcb.svg");
        assert_eq!(row.get::<String, _>("dataset_id"), "dataset-2");
        assert_eq!(row.get::<String, _>("mimetype"), "image/svg+xml");
        assert_eq!(row.get::<String, _>("text_content"), "<svg/>");
    }

    #[tokio::test]
    async fn test_unknown_mimetype_inserts_nothing() {
        let store = scoped("dataset-1").await;
        let err = store.materialize("sample-1", "unrouted.bin", "x").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownMimetype(_)));
        assert!(store.list_artifacts("sample-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_samples_ordered() {
        let store = scoped("dataset-1").await;
        for n in [3, 1, 2] {
            store
                .record_sample(&SampleRecord::new("dataset-1", n, "keyboard"))
                .await
                .unwrap();
        }
        // Re-recording replaces rather than duplicates.
        store
            .record_sample(&SampleRecord::new("dataset-1", 1, "keyboard"))
            .await
            .unwrap();

        let numbers: Vec<u32> = store
            .list_samples()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.sample_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_datasets_do_not_overwrite_each_other() {
        let base = SqliteArtifactStore::open_in_memory().await.unwrap();
        let first = base.for_dataset("dataset-1");
        let second = base.for_dataset("dataset-2");

        for (store, content) in [(&first, "keyboard"), (&second, "blinky")] {
            let dataset_id = store.dataset_scope().unwrap().to_string();
            store
                .record_sample(&SampleRecord::new(dataset_id, 1, content))
                .await
                .unwrap();
            store
                .materialize("sample-1", "unrouted.dsn", content)
                .await
                .unwrap();
        }

        assert_eq!(first.read("sample-1", "unrouted.dsn").await.unwrap(), "keyboard");
        assert_eq!(second.read("sample-1", "unrouted.dsn").await.unwrap(), "blinky");
        assert_eq!(first.list_samples().await.unwrap().len(), 1);
        assert_eq!(second.list_artifacts("sample-1").await.unwrap().len(), 1);

        let all: Vec<String> = base
            .list_samples()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.dataset_id)
            .collect();
        assert_eq!(all, vec!["dataset-1", "dataset-2"]);
    }

    #[tokio::test]
    async fn test_unscoped_and_mismatched_writes_are_rejected() {
        let base = SqliteArtifactStore::open_in_memory().await.unwrap();
        let err = base.materialize("sample-1", "unrouted.dsn", "x").await.unwrap_err();
        assert!(matches!(err, StorageError::Unscoped));

        let err = base
            .for_dataset("dataset-1")
            .record_sample(&SampleRecord::new("dataset-2", 1, "keyboard"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DatasetMismatch { .. }));
        assert!(base.list_samples().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("artifacts.db");
        let store = SqliteArtifactStore::open(path.to_str().unwrap())
            .await
            .unwrap()
            .for_dataset("dataset-1");

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(matches!(
            store.read("sample-1", "unrouted.dsn").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
