use async_trait::async_trait;
use portico_core::models::{CustomerOriginStrategy, ImageLocation, ImageStorage};
use portico_storage::{BucketStore, ObjectInBucket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::image_processor::{ImageProcessorClient, ImageProcessorRequest, ImageProcessorResponse};
use super::{AssetIngesterWorker, IngestResult, StorageCheckExemptions};
use crate::context::IngestionContext;
use crate::error::IngestError;
use crate::mover::AssetToDisk;

const OPTIMISATION: &str = "kdu_max";
const OPERATION_INGEST: &str = "ingest";
const OPERATION_DERIVATIVES_ONLY: &str = "derivatives-only";

#[derive(Debug, Clone)]
pub struct ImageBuckets {
    pub storage: String,
    pub thumbs: String,
}

/// Ingests images: download, derivative generation, upload of the image and thumbnails.
pub struct ImageIngesterWorker {
    disk: AssetToDisk,
    processor: ImageProcessorClient,
    store: Arc<dyn BucketStore>,
    buckets: ImageBuckets,
    scratch_root: PathBuf,
    exemptions: StorageCheckExemptions,
}

struct ScratchFolders {
    root: PathBuf,
    source: PathBuf,
    output: PathBuf,
    thumbs: PathBuf,
}

impl ScratchFolders {
    fn new(root: PathBuf) -> Self {
        Self {
            source: root.join("source"),
            output: root.join("output"),
            thumbs: root.join("thumbs"),
            root,
        }
    }
}

impl ImageIngesterWorker {
    pub fn new(
        disk: AssetToDisk,
        processor: ImageProcessorClient,
        store: Arc<dyn BucketStore>,
        buckets: ImageBuckets,
        scratch_root: impl Into<PathBuf>,
        exemptions: StorageCheckExemptions,
    ) -> Self {
        Self {
            disk,
            processor,
            store,
            buckets,
            scratch_root: scratch_root.into(),
            exemptions,
        }
    }

    async fn process(
        &self,
        context: &mut IngestionContext,
        folders: &ScratchFolders,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<IngestResult, IngestError> {
        let verify_size = self.exemptions.verify_size(context.asset.id.customer);
        let start = std::time::Instant::now();
        let on_disk = self
            .disk
            .copy_asset(&context.asset, &folders.source, verify_size, customer_origin_strategy, cancel)
            .await?;
        tracing::debug!(
            asset_id = %context.asset.id,
            strategy = %customer_origin_strategy.strategy,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Copied image asset to disk"
        );

        if on_disk.file_exceeds_allowance() {
            return Ok(IngestResult::StorageLimitExceeded);
        }
        if context.asset.media_type.is_empty() {
            if let Some(content_type) = &on_disk.content_type {
                context.asset.media_type = content_type.clone();
            }
        }
        let origin_path = PathBuf::from(&on_disk.location);
        context.with_asset_from_origin(on_disk);

        let use_original = context
            .asset
            .image_optimisation_policy
            .as_ref()
            .is_some_and(|p| p.is_use_original());
        let jp2 = folders.output.join(format!("{}.jp2", context.asset.id.asset));
        tokio::fs::create_dir_all(&folders.output).await?;
        tokio::fs::create_dir_all(&folders.thumbs).await?;

        let request = ImageProcessorRequest {
            job_id: uuid::Uuid::new_v4().to_string(),
            source: origin_path.to_string_lossy().into_owned(),
            destination: jp2.to_string_lossy().into_owned(),
            thumb_dir: folders.thumbs.to_string_lossy().into_owned(),
            thumb_sizes: context
                .asset
                .thumbnail_policy
                .as_ref()
                .map(|p| p.sizes.clone())
                .unwrap_or_default(),
            optimisation: OPTIMISATION.to_string(),
            image_id: context.asset.id.asset.clone(),
            origin: context.asset.origin.clone(),
            operation: (if use_original { OPERATION_DERIVATIVES_ONLY } else { OPERATION_INGEST }).to_string(),
        };
        let response = self.processor.convert(&request).await?;

        let image_file = if use_original { origin_path.as_path() } else { jp2.as_path() };
        let (size, thumbnail_size) = self.store_outputs(context, image_file, &response).await?;
        context.asset.width = Some(response.width);
        context.asset.height = Some(response.height);

        let mut storage = context
            .image_storage
            .take()
            .unwrap_or_else(|| ImageStorage::new(context.asset.id.clone(), 0, 0));
        storage.size += size;
        storage.thumbnail_size += thumbnail_size;
        storage.last_checked = chrono::Utc::now();
        context.with_storage(storage);
        Ok(IngestResult::Success)
    }

    /// Upload the image and its thumbnails, returning their sizes.
    async fn store_outputs(
        &self,
        context: &mut IngestionContext,
        image_file: &Path,
        response: &ImageProcessorResponse,
    ) -> Result<(i64, i64), IngestError> {
        let asset_path = context.asset.id.path();
        let image_object = ObjectInBucket::new(&self.buckets.storage, &asset_path);
        self.store.write_file_to_bucket(&image_object, image_file, None).await?;
        let size = file_size(image_file).await?;

        let mut thumbnail_size = 0;
        for thumb in &response.thumbs {
            let key = format!("{}/full/{},{}/0/default.jpg", asset_path, thumb.width, thumb.height);
            let thumb_path = Path::new(&thumb.path);
            self.store
                .write_file_to_bucket(&ObjectInBucket::new(&self.buckets.thumbs, key), thumb_path, Some("image/jpeg"))
                .await?;
            thumbnail_size += file_size(thumb_path).await?;
        }

        context.with_location(ImageLocation {
            id: context.asset.id.clone(),
            s3: image_object.s3_uri(),
            nas: String::new(),
        });
        Ok((size, thumbnail_size))
    }
}

async fn file_size(path: &Path) -> Result<i64, IngestError> {
    let len = tokio::fs::metadata(path).await?.len();
    Ok(i64::try_from(len).unwrap_or(i64::MAX))
}

#[async_trait]
impl AssetIngesterWorker for ImageIngesterWorker {
    #[tracing::instrument(skip_all, fields(asset_id = %context.asset.id))]
    async fn ingest(
        &self,
        context: &mut IngestionContext,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> IngestResult {
        let folders = ScratchFolders::new(self.scratch_root.join(uuid::Uuid::new_v4().to_string()));

        let result = match self.process(context, &folders, customer_origin_strategy, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Error ingesting image");
                context.asset.error = e.to_string();
                IngestResult::Failed
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&folders.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %folders.root.display(), "Failed to remove scratch folder");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::{MockStorageMetrics, StorageQuota};
    use crate::origin::{DefaultOriginStrategy, OriginFetcher};
    use portico_core::models::{Asset, AssetFamily, AssetId, ThumbnailPolicy};
    use portico_storage::LocalBucketStore;

    struct Fixture {
        dir: tempfile::TempDir,
        worker: ImageIngesterWorker,
    }

    async fn fixture(processor_url: String, metrics: MockStorageMetrics) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalBucketStore::new(dir.path().join("buckets")).await.unwrap());
        let quota = StorageQuota::new(Arc::new(metrics));
        let fetcher = OriginFetcher::new(vec![Arc::new(DefaultOriginStrategy::new(reqwest::Client::new()))]);
        let worker = ImageIngesterWorker::new(
            AssetToDisk::new(Arc::new(fetcher), quota),
            ImageProcessorClient::new(reqwest::Client::new(), processor_url),
            store,
            ImageBuckets {
                storage: "storage".to_string(),
                thumbs: "thumbs".to_string(),
            },
            dir.path().join("scratch"),
            StorageCheckExemptions::default(),
        );
        Fixture { dir, worker }
    }

    fn context(origin: String) -> IngestionContext {
        let mut asset = Asset::new(AssetId::new(2, 1, "foo"), origin, AssetFamily::Image);
        asset.thumbnail_policy = Some(ThumbnailPolicy {
            id: "default".to_string(),
            sizes: vec![100],
        });
        IngestionContext::new(asset)
    }

    #[tokio::test]
    async fn test_image_is_processed_and_uploaded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("jpeg-bytes")
            .create_async()
            .await;
        let f = fixture(server.url(), MockStorageMetrics::with_limit(0, 1_000_000)).await;

        // thumbnail the processor would have written
        let thumb = f.dir.path().join("thumb-100.jpg");
        std::fs::write(&thumb, b"thumb").unwrap();
        server
            .mock("POST", "/convert")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "width": 1000,
                    "height": 800,
                    "thumbs": [{"path": thumb.to_string_lossy(), "width": 100, "height": 80}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut context = context(format!("{}/foo.jpg", server.url()));
        context.asset.image_optimisation_policy = Some(portico_core::models::ImageOptimisationPolicy {
            id: "use-original".to_string(),
            technical_details: vec!["use-original".to_string()],
        });

        let result = f
            .worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;

        assert_eq!(result, IngestResult::Success);
        assert_eq!((context.asset.width, context.asset.height), (Some(1000), Some(800)));
        assert_eq!(context.asset.media_type, "image/jpeg");
        let buckets = f.dir.path().join("buckets");
        assert_eq!(std::fs::read(buckets.join("storage/2/1/foo")).unwrap(), b"jpeg-bytes");
        assert!(buckets.join("thumbs/2/1/foo/full/100,80/0/default.jpg").exists());
        assert_eq!(context.image_location.unwrap().s3, "s3://storage/2/1/foo");
        let storage = context.image_storage.unwrap();
        assert_eq!((storage.size, storage.thumbnail_size), (10, 5));
        assert_eq!(std::fs::read_dir(f.dir.path().join("scratch")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_processor_failure_fails_ingest() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("jpeg-bytes")
            .create_async()
            .await;
        server
            .mock("POST", "/convert")
            .with_status(500)
            .with_body(r#"{"message": "boom"}"#)
            .create_async()
            .await;
        let f = fixture(server.url(), MockStorageMetrics::with_limit(0, 1_000_000)).await;
        let mut context = context(format!("{}/foo.jpg", server.url()));

        let result = f
            .worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;

        assert_eq!(result, IngestResult::Failed);
        assert!(context.asset.error.contains("boom"));
        assert_eq!(std::fs::read_dir(f.dir.path().join("scratch")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_too_large_image_is_not_processed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("jpeg-bytes")
            .create_async()
            .await;
        let convert = server.mock("POST", "/convert").expect(0).create_async().await;
        let f = fixture(server.url(), MockStorageMetrics::with_limit(995, 1000)).await;
        let mut context = context(format!("{}/foo.jpg", server.url()));

        let result = f
            .worker
            .ingest(&mut context, &CustomerOriginStrategy::default_for(2), &CancellationToken::new())
            .await;

        assert_eq!(result, IngestResult::StorageLimitExceeded);
        convert.assert_async().await;
    }
}
