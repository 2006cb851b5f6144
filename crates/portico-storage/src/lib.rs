//! Portico Storage Library
//!
//! Bucket storage for the ingest engine: the [`BucketStore`] trait, the
//! [`ObjectInBucket`] reference type, and implementations for S3 and the local
//! filesystem.
//!
//! # Object references
//!
//! Objects are addressed as `s3://{bucket}/{key}`. The https forms used by AWS
//! (virtual-hosted and path style) are accepted when parsing origins.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod object;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_bucket_store;
#[cfg(feature = "storage-local")]
pub use local::LocalBucketStore;
pub use object::ObjectInBucket;
pub use portico_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3BucketStore;
pub use traits::{
    BucketStore, LargeObjectCopyResult, LargeObjectStatus, ObjectFromBucket, ObjectMetadata,
    SizeVerifier, StorageError, StorageResult, COPY_PART_SIZE,
};
