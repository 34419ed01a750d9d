//! Durable catalog of produced timelapse artifacts.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::Result;

/// A produced artifact, persisted once per successful assembly run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Display name: the partition label the video was assembled from.
    pub display_name: String,
    /// Window name (`DAY`, `WEEK`, ...).
    pub window: String,
    /// Absolute path of the video file.
    pub absolute_path: PathBuf,
    /// Whether the artifact has been uploaded; always false at insert.
    pub uploaded: bool,
}

/// Insert-only access to the artifact catalog.
#[async_trait]
pub trait ArtifactCatalog: Send + Sync {
    /// Persist one artifact record, returning its generated id.
    async fn insert_artifact(&self, record: &ArtifactRecord) -> Result<i64>;
}

/// Postgres-backed catalog.
pub struct PgArtifactCatalog {
    pool: PgPool,
}

impl PgArtifactCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactCatalog for PgArtifactCatalog {
    async fn insert_artifact(&self, record: &ArtifactRecord) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO videos (name, type, file_path, uploaded) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&record.display_name)
        .bind(&record.window)
        .bind(record.absolute_path.display().to_string())
        .bind(record.uploaded)
        .fetch_one(&self.pool)
        .await?;
        debug!(id, "artifact row inserted");
        Ok(id)
    }
}
