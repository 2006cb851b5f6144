use async_trait::async_trait;
use portico_core::models::{CustomerOriginStrategy, ImageLocation, ImageStorage};
use portico_storage::ObjectInBucket;
use tokio_util::sync::CancellationToken;

use super::{AssetIngesterWorker, IngestResult, StorageCheckExemptions};
use crate::context::IngestionContext;
use crate::mover::AssetToBucket;

/// Stores the origin bytes unchanged for the `file` delivery channel.
pub struct FileChannelWorker {
    mover: AssetToBucket,
    storage_bucket: String,
    exemptions: StorageCheckExemptions,
}

impl FileChannelWorker {
    pub fn new(mover: AssetToBucket, storage_bucket: impl Into<String>, exemptions: StorageCheckExemptions) -> Self {
        Self {
            mover,
            storage_bucket: storage_bucket.into(),
            exemptions,
        }
    }

    fn original_location(&self, context: &IngestionContext) -> ObjectInBucket {
        ObjectInBucket::new(&self.storage_bucket, format!("{}/original", context.asset.id.path()))
    }
}

#[async_trait]
impl AssetIngesterWorker for FileChannelWorker {
    #[tracing::instrument(skip_all, fields(asset_id = %context.asset.id))]
    async fn ingest(
        &self,
        context: &mut IngestionContext,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> IngestResult {
        if customer_origin_strategy.optimised {
            tracing::debug!(asset_id = %context.asset.id, "Asset is at an optimised origin, nothing to store");
            return IngestResult::Success;
        }

        let destination = self.original_location(context);
        let verify_size = self.exemptions.verify_size(context.asset.id.customer);
        let in_bucket = match self
            .mover
            .copy_origin_to_storage(&destination, &context.asset, verify_size, customer_origin_strategy, cancel)
            .await
        {
            Ok(in_bucket) => in_bucket,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Error ingesting asset for file channel");
                context.asset.error = e.to_string();
                return IngestResult::Failed;
            }
        };

        if in_bucket.file_exceeds_allowance() {
            context.with_asset_from_origin(in_bucket);
            return IngestResult::StorageLimitExceeded;
        }

        let size = i64::try_from(in_bucket.asset_size).unwrap_or(i64::MAX);
        let mut storage = context
            .image_storage
            .take()
            .unwrap_or_else(|| ImageStorage::new(context.asset.id.clone(), 0, 0));
        storage.size += size;
        storage.last_checked = chrono::Utc::now();
        context.with_storage(storage);
        if context.image_location.is_none() {
            context.with_location(ImageLocation {
                id: context.asset.id.clone(),
                s3: destination.s3_uri(),
                nas: String::new(),
            });
        }
        context.with_asset_from_origin(in_bucket);
        IngestResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::{AssetToDisk, MockStorageMetrics, StorageQuota};
    use crate::origin::{DefaultOriginStrategy, OriginFetcher};
    use portico_core::models::{Asset, AssetFamily, AssetId};
    use portico_storage::LocalBucketStore;
    use std::sync::Arc;

    async fn worker(dir: &std::path::Path, metrics: MockStorageMetrics, exemptions: StorageCheckExemptions) -> FileChannelWorker {
        let store = Arc::new(LocalBucketStore::new(dir.join("buckets")).await.unwrap());
        let quota = StorageQuota::new(Arc::new(metrics));
        let fetcher = OriginFetcher::new(vec![Arc::new(DefaultOriginStrategy::new(reqwest::Client::new()))]);
        let mover = AssetToBucket::new(AssetToDisk::new(Arc::new(fetcher), quota.clone()), store, quota, dir.join("scratch"));
        FileChannelWorker::new(mover, "storage", exemptions)
    }

    async fn origin_server() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/report.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("pdf-bytes")
            .create_async()
            .await;
        server
    }

    fn context(origin: String) -> IngestionContext {
        IngestionContext::new(Asset::new(AssetId::new(2, 1, "report"), origin, AssetFamily::File))
    }

    #[tokio::test]
    async fn test_original_is_stored_and_recorded() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), MockStorageMetrics::with_limit(0, 1000), StorageCheckExemptions::default()).await;
        let mut context = context(format!("{}/report.pdf", server.url()));

        let result = worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;

        assert_eq!(result, IngestResult::Success);
        assert!(dir.path().join("buckets/storage/2/1/report/original").exists());
        assert_eq!(context.image_storage.unwrap().size, 9);
        assert_eq!(context.image_location.unwrap().s3, "s3://storage/2/1/report/original");
    }

    #[tokio::test]
    async fn test_over_allowance_records_nothing() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), MockStorageMetrics::with_limit(999, 1000), StorageCheckExemptions::default()).await;
        let mut context = context(format!("{}/report.pdf", server.url()));

        let result = worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;

        assert_eq!(result, IngestResult::StorageLimitExceeded);
        assert!(context.image_storage.is_none());
    }

    #[tokio::test]
    async fn test_exempt_customer_skips_size_check() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(
            dir.path(),
            MockStorageMetrics::with_limit(999, 1000),
            StorageCheckExemptions::new(vec![2]),
        )
        .await;
        let mut context = context(format!("{}/report.pdf", server.url()));

        let result = worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;
        assert_eq!(result, IngestResult::Success);
    }

    #[tokio::test]
    async fn test_optimised_origin_needs_no_copy() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), MockStorageMetrics::with_limit(0, 1000), StorageCheckExemptions::default()).await;
        let mut context = context("s3://origin/2/1/report.pdf".to_string());
        let cos = CustomerOriginStrategy::portal_for(2, "s3://origin/.*");

        let result = worker.ingest(&mut context, &cos, &CancellationToken::new()).await;

        assert_eq!(result, IngestResult::Success);
        assert!(!dir.path().join("buckets/storage/2/1/report/original").exists());
    }
}
