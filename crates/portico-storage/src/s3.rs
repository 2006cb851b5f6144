use crate::object::ObjectInBucket;
use crate::traits::{
    BucketStore, LargeObjectCopyResult, LargeObjectStatus, ObjectFromBucket, ObjectMetadata,
    SizeVerifier, StorageError, StorageResult, COPY_PART_SIZE,
};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// S3 bucket store
#[derive(Clone)]
pub struct S3BucketStore {
    client: Client,
}

impl S3BucketStore {
    /// Create a new S3BucketStore
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let region_provider = RegionProviderChain::first_try(aws_config::Region::new(region));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config)
                .behavior_version(BehaviorVersion::latest());
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            // Path-style addressing for S3-compatible providers (MinIO, etc.)
            s3_config_builder = s3_config_builder.force_path_style(true);
            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        Ok(S3BucketStore { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn copy_source(object: &ObjectInBucket) -> String {
        format!("{}/{}", object.bucket, urlencoding::encode(&object.key))
    }

    async fn abort_upload(&self, destination: &ObjectInBucket, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                error = %e,
                destination = %destination,
                upload_id,
                "Failed to abort multipart copy"
            );
        }
    }

    /// Multipart copy of `size` bytes, checking `verify_size` and `cancel` before each part.
    async fn multipart_copy(
        &self,
        source: &ObjectInBucket,
        destination: &ObjectInBucket,
        size: u64,
        verify_size: Option<&SizeVerifier>,
        cancel: &CancellationToken,
    ) -> Result<LargeObjectStatus, StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await
            .map_err(|e| StorageError::CopyFailed(e.to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::CopyFailed("No upload ID returned from S3".to_string()))?
            .to_string();

        let copy_source = Self::copy_source(source);
        let mut parts = Vec::new();
        let mut position = 0u64;
        let mut part_number = 1i32;

        while position < size {
            let end = (position + COPY_PART_SIZE).min(size) - 1;

            if cancel.is_cancelled() {
                self.abort_upload(destination, &upload_id).await;
                return Ok(LargeObjectStatus::Cancelled);
            }
            if let Some(verify) = verify_size {
                if !verify(end + 1) {
                    self.abort_upload(destination, &upload_id).await;
                    return Ok(LargeObjectStatus::FileTooLarge);
                }
            }

            let response = match self
                .client
                .upload_part_copy()
                .bucket(&destination.bucket)
                .key(&destination.key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .copy_source(&copy_source)
                .copy_source_range(format!("bytes={}-{}", position, end))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    self.abort_upload(destination, &upload_id).await;
                    return Err(StorageError::CopyFailed(e.to_string()));
                }
            };

            let etag = response
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .map(String::from);
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(etag)
                    .build(),
            );

            position = end + 1;
            part_number += 1;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            self.abort_upload(destination, &upload_id).await;
            return Err(StorageError::CopyFailed(e.to_string()));
        }

        Ok(LargeObjectStatus::Success)
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn get_object(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectFromBucket>> {
        let response = match self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
            {
                return Ok(None)
            }
            Err(e) => {
                tracing::error!(error = %e, object = %object, "S3 get object failed");
                return Err(StorageError::DownloadFailed(e.to_string()));
            }
        };

        let content_type = response.content_type().map(String::from);
        let content_length = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());

        Ok(Some(ObjectFromBucket {
            object: object.clone(),
            stream: Box::pin(response.body.into_async_read()),
            content_type,
            content_length,
        }))
    }

    async fn get_object_metadata(
        &self,
        object: &ObjectInBucket,
    ) -> StorageResult<Option<ObjectMetadata>> {
        match self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(ObjectMetadata {
                content_type: head.content_type().map(String::from),
                content_length: head
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or_default(),
            })),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(None),
                    _ => Err(StorageError::BackendError(e.to_string())),
                },
                _ => Err(StorageError::BackendError(e.to_string())),
            },
        }
    }

    async fn write_file_to_bucket(
        &self,
        destination: &ObjectInBucket,
        path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .set_content_type(content_type.map(String::from))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    destination = %destination,
                    source = %path.display(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            destination = %destination,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
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
        let start = std::time::Instant::now();

        let size = match self.get_object_metadata(source).await {
            Ok(Some(meta)) => meta.content_length,
            Ok(None) => {
                let destination_exists = self.exists(destination).await.unwrap_or(false);
                tracing::info!(source = %source, destination_exists, "Source object for copy not found");
                return LargeObjectCopyResult::source_not_found(destination_exists);
            }
            Err(e) => {
                tracing::error!(error = %e, source = %source, "Unable to read source object metadata");
                return LargeObjectCopyResult::new(LargeObjectStatus::Error, None);
            }
        };

        let status = if size == 0 {
            // multipart uploads need at least one part, an empty object is a plain copy
            match self
                .client
                .copy_object()
                .bucket(&destination.bucket)
                .key(&destination.key)
                .copy_source(Self::copy_source(source))
                .send()
                .await
            {
                Ok(_) => Ok(LargeObjectStatus::Success),
                Err(e) => Err(StorageError::CopyFailed(e.to_string())),
            }
        } else {
            self.multipart_copy(source, destination, size, verify_size, cancel)
                .await
        };

        match status {
            Ok(status) => {
                tracing::info!(
                    source = %source,
                    destination = %destination,
                    size_bytes = size,
                    ?status,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 large object copy finished"
                );
                LargeObjectCopyResult::new(status, Some(size))
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    source = %source,
                    destination = %destination,
                    "S3 large object copy failed"
                );
                LargeObjectCopyResult::new(LargeObjectStatus::Error, Some(size))
            }
        }
    }

    async fn delete_from_bucket(&self, objects: &[ObjectInBucket]) -> StorageResult<()> {
        let mut by_bucket: std::collections::HashMap<&str, Vec<ObjectIdentifier>> =
            std::collections::HashMap::new();
        for object in objects {
            let identifier = ObjectIdentifier::builder()
                .key(&object.key)
                .build()
                .map_err(|e| StorageError::InvalidKey(e.to_string()))?;
            by_bucket.entry(object.bucket.as_str()).or_default().push(identifier);
        }

        for (bucket, identifiers) in by_bucket {
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, bucket, "S3 delete failed");
                    StorageError::DeleteFailed(e.to_string())
                })?;
        }
        Ok(())
    }
}
