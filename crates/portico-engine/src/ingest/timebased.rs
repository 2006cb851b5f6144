use async_trait::async_trait;
use portico_core::models::{metadata_keys, CustomerOriginStrategy};
use portico_storage::ObjectInBucket;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{AssetIngesterWorker, IngestResult, StorageCheckExemptions};
use crate::context::IngestionContext;
use crate::mover::AssetToBucket;
use crate::transcode::Transcoder;

/// Ingests audio and video: copies the origin to the transcoder input bucket and
/// starts a transcode. The ingest completes when the transcoder reports back.
pub struct TimebasedIngesterWorker {
    mover: AssetToBucket,
    transcoder: Arc<Transcoder>,
    input_bucket: String,
    exemptions: StorageCheckExemptions,
}

impl TimebasedIngesterWorker {
    pub fn new(
        mover: AssetToBucket,
        transcoder: Arc<Transcoder>,
        input_bucket: impl Into<String>,
        exemptions: StorageCheckExemptions,
    ) -> Self {
        Self {
            mover,
            transcoder,
            input_bucket: input_bucket.into(),
            exemptions,
        }
    }

    fn job_metadata(context: &IngestionContext) -> HashMap<String, String> {
        let origin_size = context
            .asset_from_origin
            .as_ref()
            .map_or(0, |a| a.asset_size);
        HashMap::from([
            (metadata_keys::ASSET_ID.to_string(), context.asset.id.to_string()),
            (
                metadata_keys::BATCH_ID.to_string(),
                context.asset.batch.map(|b| b.to_string()).unwrap_or_default(),
            ),
            (metadata_keys::ORIGIN_SIZE.to_string(), origin_size.to_string()),
        ])
    }
}

#[async_trait]
impl AssetIngesterWorker for TimebasedIngesterWorker {
    #[tracing::instrument(skip_all, fields(asset_id = %context.asset.id))]
    async fn ingest(
        &self,
        context: &mut IngestionContext,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> IngestResult {
        let destination = ObjectInBucket::new(&self.input_bucket, context.asset.id.path());
        let verify_size = self.exemptions.verify_size(context.asset.id.customer);

        let start = std::time::Instant::now();
        let in_bucket = match self
            .mover
            .copy_origin_to_storage(&destination, &context.asset, verify_size, customer_origin_strategy, cancel)
            .await
        {
            Ok(in_bucket) => in_bucket,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Error copying timebased asset");
                context.asset.error = e.to_string();
                return IngestResult::Failed;
            }
        };
        tracing::debug!(
            asset_id = %context.asset.id,
            strategy = %customer_origin_strategy.strategy,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Copied timebased asset"
        );

        let exceeds_allowance = in_bucket.file_exceeds_allowance();
        if context.asset.media_type.is_empty() {
            if let Some(content_type) = &in_bucket.content_type {
                context.asset.media_type = content_type.clone();
            }
        }
        context.with_asset_from_origin(in_bucket);
        if exceeds_allowance {
            return IngestResult::StorageLimitExceeded;
        }

        let metadata = Self::job_metadata(context);
        match self.transcoder.submit(context, metadata).await {
            Ok(true) => {
                tracing::debug!(asset_id = %context.asset.id, "Timebased asset queued for processing");
                IngestResult::QueuedForProcessing
            }
            Ok(false) => IngestResult::Failed,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Error starting transcode");
                context.asset.error = e.to_string();
                IngestResult::Failed
            }
        }
    }
}
