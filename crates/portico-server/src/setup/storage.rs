//! Storage setup and initialization

use anyhow::{Context, Result};
use portico_core::Config;
use portico_storage::{create_bucket_store, BucketStore};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn BucketStore>> {
    tracing::info!("Initializing bucket storage...");
    let store = create_bucket_store(config)
        .await
        .context("Failed to initialize bucket storage")?;
    tracing::info!(
        backend = ?config.storage_backend(),
        storage_bucket = config.storage_bucket(),
        thumbs_bucket = config.thumbs_bucket(),
        "Bucket storage initialized successfully"
    );
    Ok(store)
}
