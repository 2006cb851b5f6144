use anyhow::{Context, Result};
use portico_core::models::{AssetId, CustomerStorage, StorageAllowance, StoragePolicy};
use sqlx::{PgPool, Postgres};

#[derive(Debug, sqlx::FromRow)]
struct AllowanceRow {
    customer: i32,
    number_of_stored_images: i64,
    total_size_of_stored_images: i64,
    total_size_of_thumbnails: i64,
    policy_id: String,
    maximum_number_of_stored_images: i64,
    maximum_total_size_of_stored_images: i64,
}

impl AllowanceRow {
    fn to_allowance(self) -> StorageAllowance {
        StorageAllowance {
            storage: CustomerStorage {
                customer: self.customer,
                number_of_stored_images: self.number_of_stored_images,
                total_size_of_stored_images: self.total_size_of_stored_images,
                total_size_of_thumbnails: self.total_size_of_thumbnails,
            },
            policy: StoragePolicy {
                id: self.policy_id,
                maximum_number_of_stored_images: self.maximum_number_of_stored_images,
                maximum_total_size_of_stored_images: self.maximum_total_size_of_stored_images,
            },
        }
    }
}

/// Storage consumption and policy lookups.
#[derive(Clone)]
pub struct StorageRepository {
    pool: PgPool,
}

impl StorageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Customer-wide storage (space 0) and the policy it is held to.
    /// `None` when the customer has no storage record.
    #[tracing::instrument(skip(self), fields(db.table = "customer_storage"))]
    pub async fn get_storage_allowance(&self, customer: i32) -> Result<Option<StorageAllowance>> {
        let row = sqlx::query_as::<Postgres, AllowanceRow>(
            r#"
            SELECT cs.customer, cs.number_of_stored_images, cs.total_size_of_stored_images,
                   cs.total_size_of_thumbnails, sp.id AS policy_id,
                   sp.maximum_number_of_stored_images, sp.maximum_total_size_of_stored_images
            FROM customer_storage cs
            INNER JOIN storage_policies sp ON sp.id = cs.storage_policy
            WHERE cs.customer = $1 AND cs.space = 0
            "#,
        )
        .bind(customer)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer storage")?;

        Ok(row.map(AllowanceRow::to_allowance))
    }

    /// Size currently recorded for an asset, 0 if it has never been stored.
    #[tracing::instrument(skip(self), fields(db.table = "image_storage", asset_id = %id))]
    pub async fn get_asset_size(&self, id: &AssetId) -> Result<i64> {
        let size: Option<i64> = sqlx::query_scalar("SELECT size FROM image_storage WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch image storage")?;
        Ok(size.unwrap_or(0))
    }
}
