use anyhow::Result;
use portico_core::models::{AssetId, StorageAllowance};
use portico_db::StorageMetricsStore;
use portico_storage::SizeVerifier;
use std::sync::Arc;

/// Checks asset sizes against the customer's storage policy.
#[derive(Clone)]
pub struct StorageQuota {
    store: Arc<dyn StorageMetricsStore>,
}

impl StorageQuota {
    pub fn new(store: Arc<dyn StorageMetricsStore>) -> Self {
        Self { store }
    }

    /// Whether storing `size` bytes for `asset_id` keeps the customer within policy.
    /// Bytes already stored for the same asset are released by a reingest.
    pub async fn verify_file_size(&self, asset_id: &AssetId, size: u64) -> Result<bool> {
        let (allowance, replaced) = self.load(asset_id).await?;
        let permitted = Self::permits(allowance.as_ref(), replaced, size);
        if !permitted {
            tracing::info!(asset_id = %asset_id, size_bytes = size, "Asset exceeds storage allowance");
        }
        Ok(permitted)
    }

    /// Load the allowance once and return a verifier that checks running totals
    /// against it, for use during a multipart copy.
    pub async fn size_verifier(&self, asset_id: &AssetId) -> Result<Box<SizeVerifier>> {
        let (allowance, replaced) = self.load(asset_id).await?;
        Ok(Box::new(move |size: u64| Self::permits(allowance.as_ref(), replaced, size)))
    }

    async fn load(&self, asset_id: &AssetId) -> Result<(Option<StorageAllowance>, i64)> {
        let allowance = self.store.get_storage_allowance(asset_id.customer).await?;
        if allowance.is_none() {
            tracing::warn!(
                customer = asset_id.customer,
                "No storage record for customer, allowing asset"
            );
            return Ok((None, 0));
        }
        let replaced = self.store.get_asset_size(asset_id).await?;
        Ok((allowance, replaced))
    }

    fn permits(allowance: Option<&StorageAllowance>, replaced: i64, size: u64) -> bool {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        allowance.map_or(true, |a| a.permits(size, replaced))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use portico_core::models::{CustomerStorage, StoragePolicy};

    pub(crate) struct MockStorageMetrics {
        pub allowance: Option<StorageAllowance>,
        pub existing_size: i64,
    }

    impl MockStorageMetrics {
        pub(crate) fn with_limit(used: i64, max: i64) -> Self {
            Self {
                allowance: Some(StorageAllowance {
                    storage: CustomerStorage {
                        customer: 1,
                        number_of_stored_images: 1,
                        total_size_of_stored_images: used,
                        total_size_of_thumbnails: 0,
                    },
                    policy: StoragePolicy {
                        id: "default".to_string(),
                        maximum_number_of_stored_images: 100,
                        maximum_total_size_of_stored_images: max,
                    },
                }),
                existing_size: 0,
            }
        }
    }

    #[async_trait]
    impl StorageMetricsStore for MockStorageMetrics {
        async fn get_storage_allowance(&self, _customer: i32) -> Result<Option<StorageAllowance>> {
            Ok(self.allowance.clone())
        }

        async fn get_asset_size(&self, _id: &AssetId) -> Result<i64> {
            Ok(self.existing_size)
        }
    }

    #[tokio::test]
    async fn test_verify_file_size_against_policy() {
        let quota = StorageQuota::new(Arc::new(MockStorageMetrics::with_limit(90, 100)));
        let id = AssetId::new(1, 1, "a");
        assert!(quota.verify_file_size(&id, 10).await.unwrap());
        assert!(!quota.verify_file_size(&id, 11).await.unwrap());
    }

    #[tokio::test]
    async fn test_reingest_releases_existing_size() {
        let mut metrics = MockStorageMetrics::with_limit(100, 100);
        metrics.existing_size = 20;
        let quota = StorageQuota::new(Arc::new(metrics));
        assert!(quota.verify_file_size(&AssetId::new(1, 1, "a"), 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_storage_record_allows() {
        let quota = StorageQuota::new(Arc::new(MockStorageMetrics {
            allowance: None,
            existing_size: 0,
        }));
        assert!(quota.verify_file_size(&AssetId::new(1, 1, "a"), u64::MAX).await.unwrap());
    }

    #[tokio::test]
    async fn test_size_verifier_checks_running_totals() {
        let quota = StorageQuota::new(Arc::new(MockStorageMetrics::with_limit(0, 1000)));
        let verify = quota.size_verifier(&AssetId::new(1, 1, "a")).await.unwrap();
        assert!(verify(500));
        assert!(verify(1000));
        assert!(!verify(1001));
    }
}
