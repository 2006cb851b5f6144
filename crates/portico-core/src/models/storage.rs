use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::AssetId;

/// Where the bytes of an ingested asset live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLocation {
    pub id: AssetId,
    pub s3: String,
    pub nas: String,
}

impl ImageLocation {
    /// Location record for assets that are not served from a single stored object.
    pub fn empty(id: AssetId) -> Self {
        Self {
            id,
            s3: String::new(),
            nas: String::new(),
        }
    }
}

/// How much storage an ingested asset consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStorage {
    pub id: AssetId,
    pub customer: i32,
    pub space: i32,
    pub size: i64,
    pub thumbnail_size: i64,
    pub last_checked: DateTime<Utc>,
    pub check_in_progress: bool,
}

impl ImageStorage {
    pub fn new(id: AssetId, size: i64, thumbnail_size: i64) -> Self {
        Self {
            customer: id.customer,
            space: id.space,
            id,
            size,
            thumbnail_size,
            last_checked: Utc::now(),
            check_in_progress: false,
        }
    }
}

/// Current storage consumption of a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStorage {
    pub customer: i32,
    pub number_of_stored_images: i64,
    pub total_size_of_stored_images: i64,
    pub total_size_of_thumbnails: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePolicy {
    pub id: String,
    pub maximum_number_of_stored_images: i64,
    pub maximum_total_size_of_stored_images: i64,
}

/// Customer storage consumption paired with the policy it is limited by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageAllowance {
    pub storage: CustomerStorage,
    pub policy: StoragePolicy,
}

impl StorageAllowance {
    /// Whether `additional_bytes` more can be stored. `replaced_bytes` is the size of a
    /// previous version of the same asset, which is released by a reingest.
    pub fn permits(&self, additional_bytes: i64, replaced_bytes: i64) -> bool {
        let projected =
            self.storage.total_size_of_stored_images + additional_bytes - replaced_bytes.max(0);
        projected <= self.policy.maximum_total_size_of_stored_images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowance(used: i64, max: i64) -> StorageAllowance {
        StorageAllowance {
            storage: CustomerStorage {
                customer: 1,
                number_of_stored_images: 10,
                total_size_of_stored_images: used,
                total_size_of_thumbnails: 0,
            },
            policy: StoragePolicy {
                id: "default".to_string(),
                maximum_number_of_stored_images: 1000,
                maximum_total_size_of_stored_images: max,
            },
        }
    }

    #[test]
    fn test_permits_up_to_the_policy_limit() {
        let a = allowance(900, 1000);
        assert!(a.permits(100, 0));
        assert!(!a.permits(101, 0));
    }

    #[test]
    fn test_reingest_releases_previous_size() {
        let a = allowance(1000, 1000);
        assert!(!a.permits(50, 0));
        assert!(a.permits(50, 50));
    }

    #[test]
    fn test_storage_record_copies_identity() {
        let storage = ImageStorage::new(AssetId::new(4, 7, "x"), 10, 2);
        assert_eq!((storage.customer, storage.space), (4, 7));
        assert!(!storage.check_in_progress);
    }
}
