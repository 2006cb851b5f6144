use portico_core::models::{Asset, CustomerOriginStrategy};
use portico_storage::{BucketStore, LargeObjectStatus, ObjectInBucket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::disk::AssetToDisk;
use super::quota::StorageQuota;
use crate::context::AssetFromOrigin;
use crate::error::IngestError;

/// Copies assets from their origin into a bucket.
///
/// Optimised bucket-resident origins are copied bucket-to-bucket. Everything else
/// is downloaded to a scratch folder first and uploaded from there.
#[derive(Clone)]
pub struct AssetToBucket {
    disk: AssetToDisk,
    store: Arc<dyn BucketStore>,
    quota: StorageQuota,
    scratch_root: PathBuf,
}

impl AssetToBucket {
    pub fn new(
        disk: AssetToDisk,
        store: Arc<dyn BucketStore>,
        quota: StorageQuota,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            disk,
            store,
            quota,
            scratch_root: scratch_root.into(),
        }
    }

    #[tracing::instrument(skip(self, asset, customer_origin_strategy, cancel), fields(asset_id = %asset.id, destination = %destination))]
    pub async fn copy_origin_to_storage(
        &self,
        destination: &ObjectInBucket,
        asset: &Asset,
        verify_size: bool,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let mut asset_from_origin = if customer_origin_strategy.allows_direct_bucket_copy() {
            self.copy_direct(destination, asset, verify_size, cancel).await?
        } else {
            self.copy_indirect(destination, asset, verify_size, customer_origin_strategy, cancel)
                .await?
        };
        asset_from_origin.customer_origin_strategy = Some(customer_origin_strategy.clone());
        Ok(asset_from_origin)
    }

    async fn copy_direct(
        &self,
        destination: &ObjectInBucket,
        asset: &Asset,
        verify_size: bool,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let source = ObjectInBucket::parse(&asset.origin)
            .ok_or_else(|| IngestError::InvalidBucketOrigin(asset.origin.clone()))?;

        let verifier = if verify_size {
            Some(self.quota.size_verifier(&asset.id).await?)
        } else {
            None
        };

        tracing::debug!(source = %source, "Copying origin directly between buckets");
        let result = self
            .store
            .copy_large_object(&source, destination, verifier.as_deref(), cancel)
            .await;

        let content_type = Some(asset.media_type.clone()).filter(|mt| !mt.is_empty());
        let mut asset_from_origin = AssetFromOrigin::new(
            asset.id.clone(),
            result.size.unwrap_or_default(),
            destination.s3_uri(),
            content_type,
        );

        match result.status {
            LargeObjectStatus::Success => Ok(asset_from_origin),
            LargeObjectStatus::FileTooLarge => {
                asset_from_origin.file_too_large();
                Ok(asset_from_origin)
            }
            LargeObjectStatus::Cancelled => Err(IngestError::Cancelled),
            LargeObjectStatus::SourceNotFound => Err(IngestError::OriginUnavailable {
                asset_id: asset.id.to_string(),
                origin: asset.origin.clone(),
            }),
            LargeObjectStatus::Error => Err(IngestError::BucketWriteFailed {
                asset_id: asset.id.to_string(),
                destination: destination.to_string(),
                reason: "bucket copy failed".to_string(),
            }),
        }
    }

    async fn copy_indirect(
        &self,
        destination: &ObjectInBucket,
        asset: &Asset,
        verify_size: bool,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let scratch = self
            .scratch_root
            .join(asset.id.customer.to_string())
            .join(asset.id.space.to_string())
            .join(uuid::Uuid::new_v4().to_string());

        let result = self
            .download_and_upload(&scratch, destination, asset, verify_size, customer_origin_strategy, cancel)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %scratch.display(), "Failed to remove scratch folder");
            }
        }
        result
    }

    async fn download_and_upload(
        &self,
        scratch: &Path,
        destination: &ObjectInBucket,
        asset: &Asset,
        verify_size: bool,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let on_disk = self
            .disk
            .copy_asset(asset, scratch, verify_size, customer_origin_strategy, cancel)
            .await?;

        if on_disk.file_exceeds_allowance() {
            return Ok(on_disk);
        }

        self.store
            .write_file_to_bucket(destination, Path::new(&on_disk.location), on_disk.content_type.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, asset_id = %asset.id, destination = %destination, "Failed to upload asset");
                IngestError::BucketWriteFailed {
                    asset_id: asset.id.to_string(),
                    destination: destination.to_string(),
                    reason: e.to_string(),
                }
            })?;

        Ok(AssetFromOrigin::new(
            asset.id.clone(),
            on_disk.asset_size,
            destination.s3_uri(),
            on_disk.content_type,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::quota::tests::MockStorageMetrics;
    use crate::origin::{DefaultOriginStrategy, OriginFetcher};
    use portico_core::models::{AssetFamily, AssetId, OriginStrategyType};
    use portico_storage::LocalBucketStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        scratch: PathBuf,
        mover: AssetToBucket,
        store: Arc<LocalBucketStore>,
    }

    async fn fixture(metrics: MockStorageMetrics) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("buckets");
        let scratch = dir.path().join("scratch");
        let store = Arc::new(LocalBucketStore::new(&root).await.unwrap());
        let quota = StorageQuota::new(Arc::new(metrics));
        let fetcher = OriginFetcher::new(vec![Arc::new(DefaultOriginStrategy::new(reqwest::Client::new()))]);
        let disk = AssetToDisk::new(Arc::new(fetcher), quota.clone());
        let mover = AssetToBucket::new(disk, store.clone(), quota, &scratch);
        Fixture {
            _dir: dir,
            root,
            scratch,
            mover,
            store,
        }
    }

    fn portal_strategy() -> CustomerOriginStrategy {
        CustomerOriginStrategy::portal_for(2, "s3://origin/.*")
    }

    fn put_origin(root: &Path, key: &str, bytes: &[u8]) {
        let path = root.join("origin").join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn scratch_is_empty(scratch: &Path) -> bool {
        walk_files(scratch).is_empty()
    }

    fn walk_files(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .flat_map(|e| {
                let path = e.path();
                if path.is_dir() {
                    walk_files(&path)
                } else {
                    vec![path]
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_optimised_bucket_origin_is_copied_directly() {
        let f = fixture(MockStorageMetrics::with_limit(0, 1000)).await;
        put_origin(&f.root, "2/1/foo.mp4", b"0123456789");
        let asset = Asset::new(AssetId::new(2, 1, "foo"), "s3://origin/2/1/foo.mp4", AssetFamily::Timebased);
        let destination = ObjectInBucket::new("input", "2/1/foo");

        let result = f
            .mover
            .copy_origin_to_storage(&destination, &asset, true, &portal_strategy(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.asset_size, 10);
        assert_eq!(result.location, "s3://input/2/1/foo");
        assert!(!result.file_exceeds_allowance());
        assert!(f.store.exists(&destination).await.unwrap());
        assert_eq!(result.customer_origin_strategy.unwrap().strategy, OriginStrategyType::S3Ambient);
    }

    #[tokio::test]
    async fn test_direct_copy_over_allowance_is_flagged() {
        let f = fixture(MockStorageMetrics::with_limit(995, 1000)).await;
        put_origin(&f.root, "2/1/foo.mp4", b"0123456789");
        let asset = Asset::new(AssetId::new(2, 1, "foo"), "s3://origin/2/1/foo.mp4", AssetFamily::Timebased);
        let destination = ObjectInBucket::new("input", "2/1/foo");

        let result = f
            .mover
            .copy_origin_to_storage(&destination, &asset, true, &portal_strategy(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.file_exceeds_allowance());
        assert!(!f.store.exists(&destination).await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_copy_of_missing_source_is_an_error() {
        let f = fixture(MockStorageMetrics::with_limit(0, 1000)).await;
        let asset = Asset::new(AssetId::new(2, 1, "foo"), "s3://origin/2/1/none.mp4", AssetFamily::Timebased);

        let result = f
            .mover
            .copy_origin_to_storage(
                &ObjectInBucket::new("input", "2/1/foo"),
                &asset,
                false,
                &portal_strategy(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::OriginUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_http_origin_is_uploaded_and_scratch_removed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("video-bytes")
            .create_async()
            .await;
        let f = fixture(MockStorageMetrics::with_limit(0, 1000)).await;
        let asset = Asset::new(AssetId::new(2, 1, "foo"), format!("{}/foo.mp4", server.url()), AssetFamily::Timebased);
        let destination = ObjectInBucket::new("input", "2/1/foo");

        let result = f
            .mover
            .copy_origin_to_storage(
                &destination,
                &asset,
                true,
                &CustomerOriginStrategy::default_for(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.asset_size, 11);
        assert_eq!(result.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(std::fs::read(f.root.join("input/2/1/foo")).unwrap(), b"video-bytes");
        assert!(scratch_is_empty(&f.scratch));
    }

    #[tokio::test]
    async fn test_indirect_copy_over_allowance_skips_upload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("video-bytes")
            .create_async()
            .await;
        let f = fixture(MockStorageMetrics::with_limit(999, 1000)).await;
        let asset = Asset::new(AssetId::new(2, 1, "foo"), format!("{}/foo.mp4", server.url()), AssetFamily::Timebased);
        let destination = ObjectInBucket::new("input", "2/1/foo");

        let result = f
            .mover
            .copy_origin_to_storage(
                &destination,
                &asset,
                true,
                &CustomerOriginStrategy::default_for(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.file_exceeds_allowance());
        assert!(!f.store.exists(&destination).await.unwrap());
        assert!(scratch_is_empty(&f.scratch));
    }

    #[tokio::test]
    async fn test_failed_fetch_removes_scratch_and_errors() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/foo.mp4").with_status(404).create_async().await;
        let f = fixture(MockStorageMetrics::with_limit(0, 1000)).await;
        let asset = Asset::new(AssetId::new(2, 1, "foo"), format!("{}/foo.mp4", server.url()), AssetFamily::Timebased);

        let result = f
            .mover
            .copy_origin_to_storage(
                &ObjectInBucket::new("input", "2/1/foo"),
                &asset,
                true,
                &CustomerOriginStrategy::default_for(2),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(IngestError::OriginUnavailable { .. })));
        assert!(scratch_is_empty(&f.scratch));
    }
}
