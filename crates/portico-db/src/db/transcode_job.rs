use anyhow::{Context, Result};
use portico_core::models::AssetId;
use sqlx::PgPool;

/// Remembers which transcode job was submitted for an asset.
#[derive(Clone)]
pub struct TranscodeJobRepository {
    pool: PgPool,
}

impl TranscodeJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "transcode_jobs", asset_id = %asset_id))]
    pub async fn record_job(&self, asset_id: &AssetId, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transcode_jobs (asset_id, job_id, created)
            VALUES ($1, $2, NOW())
            ON CONFLICT (asset_id) DO UPDATE SET job_id = EXCLUDED.job_id, created = EXCLUDED.created
            "#,
        )
        .bind(asset_id.to_string())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to record transcode job")?;
        Ok(())
    }
}
