//! Queue message handlers for the ingest engine's listeners.

use anyhow::{Context, Result};
use async_trait::async_trait;
use portico_core::models::{metadata_keys, AssetId, TranscodeResult, TranscoderNotification};
use portico_worker::{MessageHandler, QueueMessage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::completion::TimebasedCompletion;
use crate::ingest::{AssetIngester, IngestAssetRequest, IngestResult};

/// Handles messages on the image, priority image, timebased and file queues.
pub struct IngestHandler {
    ingester: Arc<AssetIngester>,
}

impl IngestHandler {
    pub fn new(ingester: Arc<AssetIngester>) -> Self {
        Self { ingester }
    }
}

#[async_trait]
impl MessageHandler for IngestHandler {
    #[tracing::instrument(skip_all, fields(message_id = %message.id, queue = %message.queue_name))]
    async fn handle(&self, message: &QueueMessage, cancel: &CancellationToken) -> Result<bool> {
        let request: IngestAssetRequest = serde_json::from_value(message.body.clone())
            .context("Unable to deserialize ingest request")?;

        let result = self.ingester.ingest(request, cancel).await;
        Ok(result != IngestResult::Failed)
    }
}

/// Handles transcoder completion notifications.
pub struct TranscodeCompleteHandler {
    completion: Arc<TimebasedCompletion>,
}

impl TranscodeCompleteHandler {
    pub fn new(completion: Arc<TimebasedCompletion>) -> Self {
        Self { completion }
    }
}

/// Notifications arrive wrapped in a topic envelope whose `Message` is the
/// notification serialized as a string. An unwrapped notification is accepted too.
fn parse_notification(body: &serde_json::Value) -> Result<TranscoderNotification> {
    match body.get("Message").and_then(|m| m.as_str()) {
        Some(inner) => serde_json::from_str(inner).context("Unable to deserialize transcoder notification"),
        None => serde_json::from_value(body.clone()).context("Unable to deserialize transcoder notification"),
    }
}

#[async_trait]
impl MessageHandler for TranscodeCompleteHandler {
    #[tracing::instrument(skip_all, fields(message_id = %message.id, queue = %message.queue_name))]
    async fn handle(&self, message: &QueueMessage, cancel: &CancellationToken) -> Result<bool> {
        let result = TranscodeResult::from(parse_notification(&message.body)?);

        let Some(asset_id) = result
            .metadata(metadata_keys::ASSET_ID)
            .and_then(|id| id.parse::<AssetId>().ok())
        else {
            tracing::warn!(
                message_id = %message.id,
                transcode_job_id = %result.job_id,
                "Transcode notification has no valid asset id"
            );
            return Ok(false);
        };
        let batch_id = result
            .metadata(metadata_keys::BATCH_ID)
            .and_then(|batch| batch.parse::<i32>().ok());

        tracing::debug!(asset_id = %asset_id, transcode_job_id = %result.job_id, state = %result.state, "Completing timebased ingest");
        Ok(self
            .completion
            .complete_ingest(&asset_id, batch_id, &result, cancel)
            .await)
    }
}
