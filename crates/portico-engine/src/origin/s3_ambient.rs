use async_trait::async_trait;
use portico_core::models::{AssetId, CustomerOriginStrategy, OriginStrategyType};
use portico_storage::{BucketStore, ObjectInBucket};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::OriginStrategy;
use crate::context::OriginResponse;
use crate::error::IngestError;

/// Origin in a bucket readable with the engine's own credentials.
pub struct S3AmbientOriginStrategy {
    store: Arc<dyn BucketStore>,
}

impl S3AmbientOriginStrategy {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OriginStrategy for S3AmbientOriginStrategy {
    fn strategy(&self) -> OriginStrategyType {
        OriginStrategyType::S3Ambient
    }

    async fn load_asset_from_origin(
        &self,
        asset_id: &AssetId,
        origin: &str,
        _customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError> {
        let Some(object) = ObjectInBucket::parse(origin) else {
            tracing::warn!(asset_id = %asset_id, origin, "Origin is not a bucket object");
            return Ok(None);
        };

        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            found = self.store.get_object(&object) => found,
        };

        match found {
            Ok(Some(found)) => Ok(Some(
                OriginResponse::new(found.stream)
                    .with_content_type(found.content_type)
                    .with_content_length(found.content_length),
            )),
            Ok(None) => {
                tracing::warn!(asset_id = %asset_id, object = %object, "Origin object not found");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, asset_id = %asset_id, object = %object, "Error fetching asset from bucket");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_storage::LocalBucketStore;

    #[tokio::test]
    async fn test_reads_bucket_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("origin/1")).unwrap();
        std::fs::write(dir.path().join("origin/1/clip.mp4"), b"mp4").unwrap();
        let strategy = S3AmbientOriginStrategy::new(Arc::new(LocalBucketStore::new(dir.path()).await.unwrap()));
        let mut cos = CustomerOriginStrategy::default_for(1);
        cos.strategy = OriginStrategyType::S3Ambient;

        let response = strategy
            .load_asset_from_origin(&AssetId::new(1, 1, "clip"), "s3://origin/1/clip.mp4", &cos, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.content_length, Some(3));
        assert_eq!(response.content_type.as_deref(), Some("video/mp4"));

        let missing = strategy
            .load_asset_from_origin(&AssetId::new(1, 1, "x"), "s3://origin/1/none.mp4", &cos, &CancellationToken::new())
            .await
            .unwrap();
        assert!(missing.is_none());

        let not_bucket = strategy
            .load_asset_from_origin(&AssetId::new(1, 1, "x"), "https://example.org/x", &cos, &CancellationToken::new())
            .await
            .unwrap();
        assert!(not_bucket.is_none());
    }
}
