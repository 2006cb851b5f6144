//! Moving asset bytes from an origin to disk or to a bucket.

mod bucket;
mod disk;
mod quota;

pub use bucket::AssetToBucket;
pub use disk::AssetToDisk;
pub use quota::StorageQuota;

#[cfg(test)]
pub(crate) use quota::tests::MockStorageMetrics;
