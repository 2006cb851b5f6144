//! Engine asset repository: reads assets for ingest and records ingest completion.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use portico_core::models::{
    Asset, AssetApplicationMetadata, AssetFamily, AssetId, Batch, BatchOutcome, ImageDeliveryChannel,
    ImageOptimisationPolicy, ImageLocation, ImageStorage, ThumbnailPolicy,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

/// Error recorded on an asset whose batch row no longer exists.
pub const BATCH_NOT_FOUND_ERROR: &str = "Unable to find batch associated with image";

const UNKNOWN_MEDIA_TYPE: &str = "unknown";

/// Row type for the images table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct AssetRow {
    pub id: String,
    pub origin: String,
    pub media_type: String,
    pub family: AssetFamily,
    pub delivery_channels: Json<Vec<ImageDeliveryChannel>>,
    pub thumbnail_policy: Option<Json<ThumbnailPolicy>>,
    pub image_optimisation_policy: Option<Json<ImageOptimisationPolicy>>,
    pub error: String,
    pub ingesting: bool,
    pub batch: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<i64>,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

impl AssetRow {
    pub fn to_asset(self) -> Result<Asset> {
        let id: AssetId = self.id.parse()?;
        Ok(Asset {
            id,
            origin: self.origin,
            media_type: self.media_type,
            family: self.family,
            delivery_channels: self.delivery_channels.0,
            error: self.error,
            ingesting: self.ingesting,
            batch: self.batch,
            width: self.width,
            height: self.height,
            duration: self.duration,
            created: Some(self.created),
            finished: self.finished,
            thumbnail_policy: self.thumbnail_policy.map(|p| p.0),
            image_optimisation_policy: self.image_optimisation_policy.map(|p| p.0),
            application_metadata: Vec::new(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: i32,
    customer: i32,
    count: i32,
    completed: i32,
    errors: i32,
    submitted: DateTime<Utc>,
    finished: Option<DateTime<Utc>>,
    superseded: bool,
}

impl BatchRow {
    fn to_batch(self) -> Batch {
        Batch {
            id: self.id,
            customer: self.customer,
            count: self.count,
            completed: self.completed,
            errors: self.errors,
            submitted: self.submitted,
            finished: self.finished,
            superseded: self.superseded,
        }
    }
}

/// How an ingest outcome changes the asset's batch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BatchUpdate {
    /// The stored asset had already finished ingesting; counters stay as they are.
    AlreadyRecorded,
    /// The batch row no longer exists; the asset records the error instead.
    Missing,
    /// The batch accounts for every asset already.
    AlreadyFull,
    /// Write the batch's counters back.
    Count { batch: Batch, finished: bool },
}

impl BatchUpdate {
    /// Error the asset records in place of its own.
    fn asset_error(&self) -> Option<&'static str> {
        matches!(self, BatchUpdate::Missing).then_some(BATCH_NOT_FOUND_ERROR)
    }
}

/// Decide what to do with the batch of an asset whose ingest just ended.
///
/// `persisted_ingesting` is the locked row's state before this update; the batch
/// is counted only while it is still true.
fn batch_update(
    persisted_ingesting: bool,
    batch: Option<Batch>,
    errored: bool,
    now: DateTime<Utc>,
) -> BatchUpdate {
    if !persisted_ingesting {
        return BatchUpdate::AlreadyRecorded;
    }
    let Some(mut batch) = batch else {
        return BatchUpdate::Missing;
    };
    match batch.record_outcome(errored, now) {
        BatchOutcome::Counted { finished } => BatchUpdate::Count { batch, finished },
        BatchOutcome::AlreadyFull => BatchUpdate::AlreadyFull,
    }
}

/// Media type to persist, `None` to keep what is stored.
fn media_type_update(media_type: &str) -> Option<&str> {
    let trimmed = media_type.trim();
    (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(UNKNOWN_MEDIA_TYPE)).then_some(trimmed)
}

/// Repository for the assets the engine ingests.
#[derive(Clone)]
pub struct EngineAssetRepository {
    pool: PgPool,
}

impl EngineAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", asset_id = %id))]
    pub async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>> {
        let row: Option<AssetRow> = sqlx::query_as::<Postgres, AssetRow>(
            r#"
            SELECT id, origin, media_type, family, delivery_channels, thumbnail_policy,
                   image_optimisation_policy, error, ingesting, batch, width, height,
                   duration, created, finished
            FROM images
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch asset")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut asset = row.to_asset()?;

        let metadata: Vec<(String, String)> = sqlx::query_as(
            "SELECT metadata_type, metadata_value FROM asset_application_metadata WHERE asset_id = $1",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch asset application metadata")?;
        asset.application_metadata = metadata
            .into_iter()
            .map(|(metadata_type, metadata_value)| AssetApplicationMetadata {
                metadata_type,
                metadata_value,
            })
            .collect();

        Ok(Some(asset))
    }

    /// Record the outcome of an ingest.
    ///
    /// Clears `ingesting`, stamps `finished`, and writes the error, dimensions and
    /// media type carried by `asset`, upserting its application metadata by type.
    /// Location and storage rows are upserted only when given. When the asset belongs to a batch, exactly one of the batch's
    /// `completed`/`errors` counters is incremented, and only if the stored asset
    /// is still ingesting, so a redelivered completion never counts twice. A
    /// missing batch overwrites `asset.error` and the update still succeeds.
    ///
    /// Returns `Ok(false)` if the asset row does not exist.
    #[tracing::instrument(skip(self, asset, location, storage), fields(db.table = "images", asset_id = %asset.id))]
    pub async fn update_ingested_asset(
        &self,
        asset: &mut Asset,
        location: Option<&ImageLocation>,
        storage: Option<&ImageStorage>,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for ingest completion")?;

        let persisted_ingesting: Option<bool> =
            sqlx::query_scalar("SELECT ingesting FROM images WHERE id = $1 FOR UPDATE")
                .bind(asset.id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to lock asset row")?;

        let Some(persisted_ingesting) = persisted_ingesting else {
            tracing::warn!(asset_id = %asset.id, "Asset not found, unable to record ingest completion");
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(false);
        };

        let now = Utc::now();

        if let Some(batch_id) = asset.batch {
            let batch = if persisted_ingesting {
                Self::lock_batch(&mut tx, batch_id).await?
            } else {
                None
            };
            let update = batch_update(persisted_ingesting, batch, asset.has_error(), now);
            Self::apply_batch_update(&mut tx, asset, batch_id, update).await?;
        }

        sqlx::query(
            r#"
            UPDATE images
            SET error = $2,
                ingesting = FALSE,
                finished = $3,
                media_type = COALESCE($4, media_type),
                width = COALESCE($5, width),
                height = COALESCE($6, height),
                duration = COALESCE($7, duration)
            WHERE id = $1
            "#,
        )
        .bind(asset.id.to_string())
        .bind(&asset.error)
        .bind(now)
        .bind(media_type_update(&asset.media_type))
        .bind(asset.width)
        .bind(asset.height)
        .bind(asset.duration)
        .execute(&mut *tx)
        .await
        .context("Failed to update asset")?;

        if let Some(location) = location {
            sqlx::query(
                r#"
                INSERT INTO image_location (id, s3, nas)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET s3 = EXCLUDED.s3, nas = EXCLUDED.nas
                "#,
            )
            .bind(location.id.to_string())
            .bind(&location.s3)
            .bind(&location.nas)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert image location")?;
        }

        if let Some(storage) = storage {
            sqlx::query(
                r#"
                INSERT INTO image_storage (id, customer, space, size, thumbnail_size, last_checked, check_in_progress)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    size = EXCLUDED.size,
                    thumbnail_size = EXCLUDED.thumbnail_size,
                    last_checked = EXCLUDED.last_checked,
                    check_in_progress = EXCLUDED.check_in_progress
                "#,
            )
            .bind(storage.id.to_string())
            .bind(storage.customer)
            .bind(storage.space)
            .bind(storage.size)
            .bind(storage.thumbnail_size)
            .bind(storage.last_checked)
            .bind(storage.check_in_progress)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert image storage")?;
        }

        for metadata in &asset.application_metadata {
            sqlx::query(
                r#"
                INSERT INTO asset_application_metadata (asset_id, metadata_type, metadata_value, created, modified)
                VALUES ($1, $2, $3, $4, $4)
                ON CONFLICT (asset_id, metadata_type) DO UPDATE SET
                    metadata_value = EXCLUDED.metadata_value,
                    modified = EXCLUDED.modified
                "#,
            )
            .bind(asset.id.to_string())
            .bind(&metadata.metadata_type)
            .bind(&metadata.metadata_value)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert asset application metadata")?;
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, asset_id = %asset.id, "Failed to commit ingest completion");
            anyhow::anyhow!("Failed to commit ingest completion: {}", e)
        })?;

        asset.ingesting = false;
        asset.finished = Some(now);
        Ok(true)
    }

    async fn lock_batch(tx: &mut Transaction<'_, Postgres>, batch_id: i32) -> Result<Option<Batch>> {
        let row: Option<BatchRow> = sqlx::query_as::<Postgres, BatchRow>(
            r#"
            SELECT id, customer, count, completed, errors, submitted, finished, superseded
            FROM batches
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to lock batch row")?;

        Ok(row.map(BatchRow::to_batch))
    }

    async fn apply_batch_update(
        tx: &mut Transaction<'_, Postgres>,
        asset: &mut Asset,
        batch_id: i32,
        update: BatchUpdate,
    ) -> Result<()> {
        if let Some(error) = update.asset_error() {
            asset.error = error.to_string();
        }
        match update {
            BatchUpdate::AlreadyRecorded => {
                tracing::info!(
                    asset_id = %asset.id,
                    batch_id,
                    "Asset already completed, batch counters left unchanged"
                );
            }
            BatchUpdate::Missing => {
                tracing::warn!(asset_id = %asset.id, batch_id, "Batch not found for ingested asset");
            }
            BatchUpdate::AlreadyFull => {
                tracing::warn!(
                    asset_id = %asset.id,
                    batch_id,
                    "Batch already accounts for every asset, not counting again"
                );
            }
            BatchUpdate::Count { batch, finished } => {
                sqlx::query(
                    "UPDATE batches SET completed = $2, errors = $3, finished = $4 WHERE id = $1",
                )
                .bind(batch.id)
                .bind(batch.completed)
                .bind(batch.errors)
                .bind(batch.finished)
                .execute(&mut **tx)
                .await
                .context("Failed to update batch counters")?;

                if finished {
                    tracing::info!(batch_id, count = batch.count, errors = batch.errors, "Batch finished");
                }
            }
        }
        Ok(())
    }
}
