use portico_core::mime;
use portico_core::models::{Asset, CustomerOriginStrategy};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::quota::StorageQuota;
use crate::context::{AssetFromOrigin, OriginResponse};
use crate::error::IngestError;
use crate::origin::OriginFetcher;

const FALLBACK_EXTENSION: &str = "file";
const CHUNK_SIZE: usize = 64 * 1024;

/// Copies assets from their origin to local disk.
#[derive(Clone)]
pub struct AssetToDisk {
    fetcher: Arc<OriginFetcher>,
    quota: StorageQuota,
}

impl AssetToDisk {
    pub fn new(fetcher: Arc<OriginFetcher>, quota: StorageQuota) -> Self {
        Self { fetcher, quota }
    }

    /// Fetch `asset` and write it into `destination_folder` as `{name}.{extension}`.
    ///
    /// When `verify_size` is set the result is flagged, not rejected, if the asset
    /// does not fit the customer's storage allowance.
    #[tracing::instrument(skip(self, asset, customer_origin_strategy, cancel), fields(asset_id = %asset.id))]
    pub async fn copy_asset(
        &self,
        asset: &Asset,
        destination_folder: &Path,
        verify_size: bool,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let response = self
            .fetcher
            .fetch(&asset.id, &asset.origin, customer_origin_strategy, cancel)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    asset_id = %asset.id,
                    origin = %asset.origin,
                    strategy = %customer_origin_strategy.strategy,
                    "Unable to fetch asset from origin"
                );
                IngestError::OriginUnavailable {
                    asset_id: asset.id.to_string(),
                    origin: asset.origin.clone(),
                }
            })?;

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut asset_from_origin = Self::save_to_disk(asset, destination_folder, response, cancel).await?;
        asset_from_origin.customer_origin_strategy = Some(customer_origin_strategy.clone());

        if verify_size
            && !self
                .quota
                .verify_file_size(&asset.id, asset_from_origin.asset_size)
                .await?
        {
            asset_from_origin.file_too_large();
        }

        Ok(asset_from_origin)
    }

    async fn save_to_disk(
        asset: &Asset,
        destination_folder: &Path,
        mut response: OriginResponse,
        cancel: &CancellationToken,
    ) -> Result<AssetFromOrigin, IngestError> {
        let content_type = resolve_content_type(asset, response.content_type.as_deref());
        let extension = mime::extension_for_content_type(content_type.as_deref()).unwrap_or_else(|| {
            tracing::info!(content_type = ?content_type, "Unable to get a file extension for content type");
            FALLBACK_EXTENSION
        });

        let target = destination_folder.join(format!("{}.{}", asset.id.asset, extension));
        remove_if_exists(&target).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let start = std::time::Instant::now();
        let mut file = fs::File::create(&target).await?;
        let size = match response.content_length {
            Some(length) => {
                let copied = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                    copied = tokio::io::copy(&mut response.stream, &mut file) => copied?,
                };
                if copied != length {
                    tracing::warn!(
                        asset_id = %asset.id,
                        content_length = length,
                        copied,
                        "Origin content-length differs from bytes received"
                    );
                }
                length
            }
            None => copy_chunked(&mut response, &mut file, cancel).await?,
        };
        file.flush().await?;

        tracing::debug!(
            asset_id = %asset.id,
            target = %target.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Saved origin to disk"
        );

        Ok(AssetFromOrigin::new(
            asset.id.clone(),
            size,
            target.to_string_lossy().into_owned(),
            content_type,
        ))
    }
}

/// Copy without a known length, counting bytes as they arrive.
async fn copy_chunked(
    response: &mut OriginResponse,
    file: &mut fs::File,
    cancel: &CancellationToken,
) -> Result<u64, IngestError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            read = response.stream.read(&mut buffer) => read?,
        };
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).await?;
        received += read as u64;
    }
    Ok(received)
}

async fn remove_if_exists(path: &PathBuf) -> Result<(), IngestError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed existing file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Origin content-type, re-guessed from the origin url then the asset name when
/// missing or a generic binary type.
fn resolve_content_type(asset: &Asset, content_type: Option<&str>) -> Option<String> {
    if content_type.is_some() && !mime::is_binary_octet(content_type) {
        return content_type.map(String::from);
    }

    let guess = extension_of(&asset.origin)
        .and_then(mime::content_type_for_extension)
        .or_else(|| extension_of(&asset.id.asset).and_then(mime::content_type_for_extension));

    match guess {
        Some(guess) => {
            tracing::debug!(asset_id = %asset.id, content_type = guess, "Guessed content type from name");
            Some(guess.to_string())
        }
        None => content_type.map(String::from),
    }
}

/// Extension of the last path segment, ignoring any query or fragment.
fn extension_of(name: &str) -> Option<&str> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::quota::tests::MockStorageMetrics;
    use crate::origin::DefaultOriginStrategy;
    use portico_core::models::{AssetFamily, AssetId};

    fn mover(metrics: MockStorageMetrics) -> AssetToDisk {
        let fetcher = OriginFetcher::new(vec![Arc::new(DefaultOriginStrategy::new(reqwest::Client::new()))]);
        AssetToDisk::new(Arc::new(fetcher), StorageQuota::new(Arc::new(metrics)))
    }

    fn asset(origin: String, name: &str) -> Asset {
        Asset::new(AssetId::new(1, 2, name), origin, AssetFamily::Image)
    }

    #[tokio::test]
    async fn test_writes_file_named_from_content_type() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("png-bytes")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let result = mover(MockStorageMetrics::with_limit(0, 1000))
            .copy_asset(
                &asset(format!("{}/a", server.url()), "foo"),
                dir.path(),
                true,
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.asset_size, 9);
        assert!(result.location.ends_with("foo.png"));
        assert!(!result.file_exceeds_allowance());
        assert_eq!(std::fs::read(&result.location).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_binary_content_type_is_guessed_from_origin() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/media/clip.mp4")
            .with_status(200)
            .with_header("content-type", "binary/octet-stream")
            .with_body("mp4")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let result = mover(MockStorageMetrics::with_limit(0, 1000))
            .copy_asset(
                &asset(format!("{}/media/clip.mp4", server.url()), "clip"),
                dir.path(),
                false,
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.content_type.as_deref(), Some("video/mp4"));
        assert!(result.location.ends_with("clip.mp4"));
    }

    #[tokio::test]
    async fn test_unknown_type_uses_file_extension() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/blob")
            .with_status(200)
            .with_header("content-type", "application/x-unknown")
            .with_body("??")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let result = mover(MockStorageMetrics::with_limit(0, 1000))
            .copy_asset(
                &asset(format!("{}/blob", server.url()), "blob"),
                dir.path(),
                false,
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.location.ends_with("blob.file"));
    }

    #[tokio::test]
    async fn test_second_write_replaces_first() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/a.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("first-version")
            .expect(1)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let disk = mover(MockStorageMetrics::with_limit(0, 1000));
        let asset = asset(format!("{}/a.jpg", server.url()), "a");
        let cos = CustomerOriginStrategy::default_for(1);

        disk.copy_asset(&asset, dir.path(), false, &cos, &CancellationToken::new())
            .await
            .unwrap();
        first.remove_async().await;
        server
            .mock("GET", "/a.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("2nd")
            .create_async()
            .await;
        let second = disk
            .copy_asset(&asset, dir.path(), false, &cos, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&second.location).unwrap(), b"2nd");
        assert_eq!(second.asset_size, 3);
    }

    #[tokio::test]
    async fn test_unknown_length_counts_streamed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let asset = asset("https://example.org/a.jpg".to_string(), "a");
        let response = OriginResponse::new(Box::pin(std::io::Cursor::new(vec![7u8; 200_000])))
            .with_content_type(Some("image/jpeg".to_string()));

        let result = AssetToDisk::save_to_disk(&asset, dir.path(), response, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.asset_size, 200_000);
        assert_eq!(std::fs::metadata(&result.location).unwrap().len(), 200_000);
    }

    #[tokio::test]
    async fn test_flags_file_over_allowance() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("0123456789")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let result = mover(MockStorageMetrics::with_limit(995, 1000))
            .copy_asset(
                &asset(format!("{}/big.jpg", server.url()), "big"),
                dir.path(),
                true,
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.file_exceeds_allowance());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error_not_a_size_flag() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/gone").with_status(500).create_async().await;
        let dir = tempfile::tempdir().unwrap();

        let result = mover(MockStorageMetrics::with_limit(0, 1000))
            .copy_asset(
                &asset(format!("{}/gone", server.url()), "gone"),
                dir.path(),
                true,
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::OriginUnavailable { .. })));
    }

    #[test]
    fn test_extension_of_ignores_query() {
        assert_eq!(extension_of("https://x.org/a/b.tif?sig=1"), Some("tif"));
        assert_eq!(extension_of("https://x.org/a/b"), None);
        assert_eq!(extension_of("foo.jpg"), Some("jpg"));
    }
}
