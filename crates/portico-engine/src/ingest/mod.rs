//! Ingesting assets: family workers and the ingester that drives them.

mod file;
mod image;
mod image_processor;
mod ingester;
mod timebased;

pub use file::FileChannelWorker;
pub use image::{ImageBuckets, ImageIngesterWorker};
pub use image_processor::{ImageProcessorClient, ImageProcessorRequest, ImageProcessorResponse, ProcessedThumb};
pub use ingester::AssetIngester;
pub use timebased::TimebasedIngesterWorker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portico_core::models::{Asset, CustomerOriginStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::context::IngestionContext;

/// Error recorded on an asset that does not fit its customer's storage policy.
pub const STORAGE_LIMIT_EXCEEDED_ERROR: &str = "StoragePolicy size limit exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    Success,
    /// Handed to an asynchronous process that completes the ingest later.
    QueuedForProcessing,
    Failed,
    StorageLimitExceeded,
}

impl fmt::Display for IngestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestResult::Success => write!(f, "success"),
            IngestResult::QueuedForProcessing => write!(f, "queued-for-processing"),
            IngestResult::Failed => write!(f, "failed"),
            IngestResult::StorageLimitExceeded => write!(f, "storage-limit-exceeded"),
        }
    }
}

/// Body of an ingest queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAssetRequest {
    pub asset: Asset,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl IngestAssetRequest {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            created: Some(Utc::now()),
        }
    }
}

/// Ingests one part of an asset. Failures are recorded on the context's asset.
#[async_trait]
pub trait AssetIngesterWorker: Send + Sync {
    async fn ingest(
        &self,
        context: &mut IngestionContext,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> IngestResult;
}

/// Customers whose ingests skip the storage allowance check.
#[derive(Debug, Clone, Default)]
pub struct StorageCheckExemptions(Vec<i32>);

impl StorageCheckExemptions {
    pub fn new(customers: Vec<i32>) -> Self {
        Self(customers)
    }

    /// Whether ingests for `customer` verify asset size.
    pub fn verify_size(&self, customer: i32) -> bool {
        !self.0.contains(&customer)
    }
}
