use crate::object::ObjectInBucket;
use crate::traits::{
    BucketStore, LargeObjectCopyResult, LargeObjectStatus, ObjectFromBucket, ObjectMetadata,
    SizeVerifier, StorageError, StorageResult, COPY_PART_SIZE,
};
use async_trait::async_trait;
use portico_core::mime;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Filesystem bucket store: every bucket is a directory under `base_path`.
#[derive(Clone)]
pub struct LocalBucketStore {
    base_path: PathBuf,
}

impl LocalBucketStore {
    /// Create a new LocalBucketStore rooted at `base_path` (e.g. "/var/lib/portico/buckets").
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalBucketStore { base_path })
    }

    /// Map an object to its path, rejecting keys that could escape the bucket.
    fn object_path(&self, object: &ObjectInBucket) -> StorageResult<PathBuf> {
        for part in [&object.bucket, &object.key] {
            if part.is_empty() || part.starts_with('/') || part.split('/').any(|s| s == "..") {
                return Err(StorageError::InvalidKey(format!(
                    "Invalid object reference {}",
                    object
                )));
            }
        }
        Ok(self.base_path.join(&object.bucket).join(&object.key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn copy_parts(
        &self,
        source_path: &Path,
        destination_path: &Path,
        verify_size: Option<&SizeVerifier>,
        cancel: &CancellationToken,
    ) -> StorageResult<LargeObjectStatus> {
        Self::ensure_parent(destination_path).await?;
        let mut reader = fs::File::open(source_path).await?;
        let mut writer = fs::File::create(destination_path).await?;
        let mut buffer = vec![0u8; COPY_PART_SIZE as usize];
        let mut copied = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Ok(LargeObjectStatus::Cancelled);
            }

            let mut in_part = 0usize;
            while in_part < buffer.len() {
                let read = reader.read(&mut buffer[in_part..]).await?;
                if read == 0 {
                    break;
                }
                in_part += read;
            }
            if in_part == 0 {
                break;
            }

            if let Some(verify) = verify_size {
                if !verify(copied + in_part as u64) {
                    return Ok(LargeObjectStatus::FileTooLarge);
                }
            }

            writer.write_all(&buffer[..in_part]).await?;
            copied += in_part as u64;

            if in_part < buffer.len() {
                break;
            }
        }

        writer.flush().await?;
        Ok(LargeObjectStatus::Success)
    }
}

fn content_type_for(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime::content_type_for_extension)
        .map(String::from)
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    async fn get_object(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectFromBucket>> {
        let path = self.object_path(object)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::DownloadFailed(e.to_string())),
        };
        let content_length = file.metadata().await?.len();

        Ok(Some(ObjectFromBucket {
            object: object.clone(),
            stream: Box::pin(file),
            content_type: content_type_for(&path),
            content_length: Some(content_length),
        }))
    }

    async fn get_object_metadata(
        &self,
        object: &ObjectInBucket,
    ) -> StorageResult<Option<ObjectMetadata>> {
        let path = self.object_path(object)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMetadata {
                content_type: content_type_for(&path),
                content_length: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn write_file_to_bucket(
        &self,
        destination: &ObjectInBucket,
        path: &Path,
        _content_type: Option<&str>,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let target = self.object_path(destination)?;
        Self::ensure_parent(&target).await?;

        let size = fs::copy(path, &target).await.map_err(|e| {
            tracing::error!(
                error = %e,
                source = %path.display(),
                destination = %destination,
                "Local bucket write failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::debug!(
            destination = %destination,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local bucket write successful"
        );
        Ok(())
    }

    async fn copy_large_object(
        &self,
        source: &ObjectInBucket,
        destination: &ObjectInBucket,
        verify_size: Option<&SizeVerifier>,
        cancel: &CancellationToken,
    ) -> LargeObjectCopyResult {
        let (source_path, destination_path) =
            match (self.object_path(source), self.object_path(destination)) {
                (Ok(s), Ok(d)) => (s, d),
                _ => return LargeObjectCopyResult::new(LargeObjectStatus::Error, None),
            };

        let size = match fs::metadata(&source_path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                let destination_exists = fs::metadata(&destination_path).await.is_ok();
                tracing::info!(
                    source = %source,
                    destination_exists,
                    "Source object for copy not found"
                );
                return LargeObjectCopyResult::source_not_found(destination_exists);
            }
        };

        match self
            .copy_parts(&source_path, &destination_path, verify_size, cancel)
            .await
        {
            Ok(LargeObjectStatus::Success) => {
                LargeObjectCopyResult::new(LargeObjectStatus::Success, Some(size))
            }
            Ok(status) => {
                let _ = fs::remove_file(&destination_path).await;
                tracing::info!(source = %source, destination = %destination, ?status, "Copy halted");
                LargeObjectCopyResult::new(status, Some(size))
            }
            Err(e) => {
                let _ = fs::remove_file(&destination_path).await;
                tracing::error!(error = %e, source = %source, destination = %destination, "Copy failed");
                LargeObjectCopyResult::new(LargeObjectStatus::Error, Some(size))
            }
        }
    }

    async fn delete_from_bucket(&self, objects: &[ObjectInBucket]) -> StorageResult<()> {
        for object in objects {
            let path = self.object_path(object)?;
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::DeleteFailed(e.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store_with(bytes: &[u8]) -> (tempfile::TempDir, LocalBucketStore, ObjectInBucket) {
        let dir = tempdir().unwrap();
        let store = LocalBucketStore::new(dir.path()).await.unwrap();
        let source = ObjectInBucket::new("origin", "2/1/foo.mp4");
        let path = dir.path().join("origin/2/1/foo.mp4");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        (dir, store, source)
    }

    #[tokio::test]
    async fn test_copy_large_object_copies_all_bytes() {
        let (_dir, store, source) = store_with(b"0123456789").await;
        let destination = ObjectInBucket::new("storage", "2/1/foo/original");

        let result = store
            .copy_large_object(&source, &destination, None, &CancellationToken::new())
            .await;

        assert_eq!(result.status, LargeObjectStatus::Success);
        assert_eq!(result.size, Some(10));
        let meta = store.get_object_metadata(&destination).await.unwrap().unwrap();
        assert_eq!(meta.content_length, 10);
    }

    #[tokio::test]
    async fn test_copy_large_object_halts_when_verifier_refuses() {
        let (_dir, store, source) = store_with(b"0123456789").await;
        let destination = ObjectInBucket::new("storage", "2/1/foo/original");
        let verify = |size: u64| size <= 5;

        let result = store
            .copy_large_object(&source, &destination, Some(&verify), &CancellationToken::new())
            .await;

        assert_eq!(result.status, LargeObjectStatus::FileTooLarge);
        assert!(!store.exists(&destination).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_large_object_reports_missing_source() {
        let (_dir, store, _) = store_with(b"x").await;
        let missing = ObjectInBucket::new("origin", "nope");
        let destination = ObjectInBucket::new("origin", "2/1/foo.mp4");

        let result = store
            .copy_large_object(&missing, &destination, None, &CancellationToken::new())
            .await;

        assert_eq!(result.status, LargeObjectStatus::SourceNotFound);
        assert!(result.destination_exists);
    }

    #[tokio::test]
    async fn test_copy_large_object_honours_cancellation() {
        let (_dir, store, source) = store_with(b"abc").await;
        let destination = ObjectInBucket::new("storage", "copy");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = store
            .copy_large_object(&source, &destination, None, &cancel)
            .await;

        assert_eq!(result.status, LargeObjectStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_get_object_streams_content() {
        let (_dir, store, source) = store_with(b"hello").await;
        let mut object = store.get_object(&source).await.unwrap().unwrap();
        let mut body = Vec::new();
        object.stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(object.content_length, Some(5));
        assert_eq!(object.content_type.as_deref(), Some("video/mp4"));

        let missing = store
            .get_object(&ObjectInBucket::new("origin", "missing"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, store, _) = store_with(b"x").await;
        let result = store
            .get_object_metadata(&ObjectInBucket::new("origin", "../etc/passwd"))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_objects() {
        let (_dir, store, source) = store_with(b"x").await;
        store
            .delete_from_bucket(&[source.clone(), ObjectInBucket::new("origin", "missing")])
            .await
            .unwrap();
        assert!(!store.exists(&source).await.unwrap());
    }
}
