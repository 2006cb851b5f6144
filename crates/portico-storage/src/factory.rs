#[cfg(feature = "storage-local")]
use crate::LocalBucketStore;
#[cfg(feature = "storage-s3")]
use crate::S3BucketStore;
use crate::{BucketStore, StorageBackend, StorageError, StorageResult};
use portico_core::Config;
use std::sync::Arc;

/// Create the bucket store selected by configuration
pub async fn create_bucket_store(config: &Config) -> StorageResult<Arc<dyn BucketStore>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let store = S3BucketStore::new(
                config.aws_region().to_string(),
                config.s3_endpoint().map(String::from),
            )
            .await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let store = LocalBucketStore::new(base_path).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
