use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::object::ObjectInBucket;

/// Size of each part of a multipart copy.
pub const COPY_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Called with the number of bytes a copy will have written once the next part
/// lands. Returning `false` halts the copy.
pub type SizeVerifier = dyn Fn(u64) -> bool + Send + Sync;

/// An object read from a bucket. The stream is consumed once.
pub struct ObjectFromBucket {
    pub object: ObjectInBucket,
    pub stream: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeObjectStatus {
    Success,
    /// Halted by the size verifier.
    FileTooLarge,
    SourceNotFound,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeObjectCopyResult {
    pub status: LargeObjectStatus,
    /// Size of the source object, when it could be read.
    pub size: Option<u64>,
    /// Set when the source is missing: whether the destination already exists.
    pub destination_exists: bool,
}

impl LargeObjectCopyResult {
    pub fn new(status: LargeObjectStatus, size: Option<u64>) -> Self {
        Self {
            status,
            size,
            destination_exists: false,
        }
    }

    pub fn source_not_found(destination_exists: bool) -> Self {
        Self {
            status: LargeObjectStatus::SourceNotFound,
            size: None,
            destination_exists,
        }
    }
}

/// Bucket storage used by the ingest engine.
///
/// Implementations read origins that already live in a bucket, write ingested
/// assets and derivatives, and move transcoder outputs between buckets.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Open an object for reading. `Ok(None)` if the object does not exist.
    async fn get_object(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectFromBucket>>;

    /// Size and content-type of an object. `Ok(None)` if the object does not exist.
    async fn get_object_metadata(
        &self,
        object: &ObjectInBucket,
    ) -> StorageResult<Option<ObjectMetadata>>;

    async fn exists(&self, object: &ObjectInBucket) -> StorageResult<bool> {
        Ok(self.get_object_metadata(object).await?.is_some())
    }

    /// Upload a local file.
    async fn write_file_to_bucket(
        &self,
        destination: &ObjectInBucket,
        path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Copy an object of any size between buckets, in parts.
    ///
    /// `verify_size` is asked before each part with the running total; a `false`
    /// aborts the copy with [`LargeObjectStatus::FileTooLarge`]. Failures are
    /// reported through the status rather than as errors.
    async fn copy_large_object(
        &self,
        source: &ObjectInBucket,
        destination: &ObjectInBucket,
        verify_size: Option<&SizeVerifier>,
        cancel: &CancellationToken,
    ) -> LargeObjectCopyResult;

    async fn delete_from_bucket(&self, objects: &[ObjectInBucket]) -> StorageResult<()>;
}
