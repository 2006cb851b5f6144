//! Recording the outcome of a transcode job against its asset.

use portico_core::mime;
use portico_core::models::{
    metadata_types, Asset, AssetId, AvTranscode, ImageLocation, ImageStorage, TranscodeOutput,
    TranscodeResult, TranscoderPreset,
};
use portico_db::AssetStore;
use portico_storage::{BucketStore, LargeObjectCopyResult, LargeObjectStatus, ObjectInBucket};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::notification::AssetNotificationSender;
use crate::transcode::{templates, TranscoderLookup};

/// Buckets a transcode moves through.
#[derive(Debug, Clone)]
pub struct TimebasedBuckets {
    pub input: String,
    pub output: String,
    pub storage: String,
}

pub struct TimebasedCompletion {
    assets: Arc<dyn AssetStore>,
    store: Arc<dyn BucketStore>,
    lookup: Arc<TranscoderLookup>,
    buckets: TimebasedBuckets,
    notifications: Option<AssetNotificationSender>,
}

impl TimebasedCompletion {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        store: Arc<dyn BucketStore>,
        lookup: Arc<TranscoderLookup>,
        buckets: TimebasedBuckets,
        notifications: Option<AssetNotificationSender>,
    ) -> Self {
        Self {
            assets,
            store,
            lookup,
            buckets,
            notifications,
        }
    }

    /// Move transcode outputs into storage and mark the asset as ingested.
    ///
    /// Returns `true` only when the transcode succeeded, every output was stored and
    /// the asset was updated. Failures are recorded on the asset's error.
    #[tracing::instrument(skip(self, result, cancel), fields(asset_id = %asset_id, transcode_job_id = %result.job_id))]
    pub async fn complete_ingest(
        &self,
        asset_id: &AssetId,
        batch_id: Option<i32>,
        result: &TranscodeResult,
        cancel: &CancellationToken,
    ) -> bool {
        let mut asset = match self.assets.get_asset(asset_id).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                tracing::error!(asset_id = %asset_id, "Unable to find asset to complete");
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, asset_id = %asset_id, "Failed to load asset to complete");
                return false;
            }
        };
        let before = asset.clone();
        asset.batch = asset.batch.or(batch_id);

        let mut errors = Vec::new();
        if !result.is_complete() {
            let code = result
                .error_code
                .map_or_else(|| "unknown".to_string(), |code| code.to_string());
            errors.push(format!("Transcode failed with status: {}. Error: {}", result.state, code));
        }

        let size = self.copy_outputs(&mut asset, &result.outputs, &mut errors, cancel).await;
        self.delete_input(&result.input_key).await;

        let transcode_success = errors.is_empty();
        if !transcode_success {
            asset.error = errors.join("|");
        }

        let storage = ImageStorage::new(asset.id.clone(), size, 0);
        let location = ImageLocation::empty(asset.id.clone());
        let updated = match self
            .assets
            .update_ingested_asset(&mut asset, Some(&location), Some(&storage))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %asset.id, "Failed to mark timebased asset as completed");
                false
            }
        };

        if updated {
            if let Some(notifications) = &self.notifications {
                notifications.send_asset_modified(Some(&before), &asset).await;
            }
        }

        transcode_success && updated
    }

    /// Copy each complete output to storage and return the total bytes stored.
    ///
    /// Every stored output is recorded in the asset's `AVTranscodes` metadata.
    /// Outputs made with a preset the transcoder no longer lists are skipped.
    async fn copy_outputs(
        &self,
        asset: &mut Asset,
        outputs: &[TranscodeOutput],
        errors: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> i64 {
        let presets = match self.lookup.get_presets_by_id().await {
            Ok(presets) => presets,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %asset.id, "Failed to load transcoder presets");
                errors.push(format!("Unable to load transcoder presets: {}", e));
                return 0;
            }
        };

        let mut dimensions_set = false;
        let mut total = 0i64;
        let mut transcodes = Vec::with_capacity(outputs.len());

        for output in outputs {
            if !output.is_complete() {
                tracing::warn!(status = %output.status, key = %output.key, "Incomplete transcode output");
                errors.push(format!(
                    "Transcode output for {} has status {} with detail {}",
                    output.key,
                    output.status,
                    output.status_detail.as_deref().unwrap_or_default()
                ));
                continue;
            }

            let Some(preset) = presets.get(&output.preset_id) else {
                tracing::error!(preset_id = %output.preset_id, key = %output.key, "Unable to find preset for transcode output");
                continue;
            };

            if !dimensions_set {
                asset.width = output.width;
                asset.height = output.height;
                asset.duration = output.duration_ms();
                dimensions_set = true;
            } else if output.duration_ms() != asset.duration {
                tracing::warn!(
                    asset_id = %asset.id,
                    first_ms = ?asset.duration,
                    other_ms = ?output.duration_ms(),
                    "Transcode outputs have different durations"
                );
            }

            let destination = ObjectInBucket::new(
                &self.buckets.storage,
                templates::final_destination_key(&output.key),
            );
            let copy = self.copy_output(&asset.id, output, &destination, cancel).await;
            if is_copy_successful(&copy) {
                transcodes.push(av_transcode(output, &destination, &asset.media_type, preset));
                total += copy.size.map_or(0, |s| i64::try_from(s).unwrap_or(i64::MAX));
            } else {
                errors.push(format!("Copying transcode output failed with reason: {:?}", copy.status));
            }
        }

        if !transcodes.is_empty() {
            match serde_json::to_string(&transcodes) {
                Ok(value) => asset.upsert_application_metadata(metadata_types::AV_TRANSCODES, value),
                Err(e) => {
                    tracing::error!(error = %e, asset_id = %asset.id, "Failed to serialize transcode metadata");
                }
            }
        }
        total
    }

    async fn copy_output(
        &self,
        asset_id: &AssetId,
        output: &TranscodeOutput,
        destination: &ObjectInBucket,
        cancel: &CancellationToken,
    ) -> LargeObjectCopyResult {
        let source = ObjectInBucket::new(&self.buckets.output, &output.key);

        let copy = self
            .store
            .copy_large_object(&source, destination, None, cancel)
            .await;

        match copy.status {
            LargeObjectStatus::Success => {
                if let Err(e) = self.store.delete_from_bucket(std::slice::from_ref(&source)).await {
                    tracing::warn!(error = %e, source = %source, "Failed to delete transcode output");
                }
                tracing::debug!(asset_id = %asset_id, source = %source, destination = %destination, "Stored transcode output");
            }
            LargeObjectStatus::SourceNotFound => {
                tracing::info!(
                    asset_id = %asset_id,
                    source = %source,
                    destination_exists = copy.destination_exists,
                    "Transcode output not found"
                );
            }
            _ => {}
        }
        copy
    }

    async fn delete_input(&self, input_key: &str) {
        if input_key.is_empty() {
            return;
        }
        let input = ObjectInBucket::new(&self.buckets.input, input_key);
        if let Err(e) = self.store.delete_from_bucket(std::slice::from_ref(&input)).await {
            tracing::warn!(error = %e, input = %input, "Failed to delete transcode input");
        }
    }
}

/// Describe a stored output. Dimensions are kept for video only; an extension
/// without a known content-type falls back to `video/{ext}` or `audio/{ext}`.
fn av_transcode(
    output: &TranscodeOutput,
    destination: &ObjectInBucket,
    asset_media_type: &str,
    preset: &TranscoderPreset,
) -> AvTranscode {
    let is_video = mime::is_video(asset_media_type);
    let extension = preset.extension.clone();
    let media_type = match mime::content_type_for_extension(&extension) {
        Some(content_type) => content_type.to_string(),
        None if is_video => format!("video/{}", extension),
        None => format!("audio/{}", extension),
    };

    AvTranscode {
        location: destination.s3_uri(),
        transcode_name: preset.name.clone(),
        extension,
        media_type,
        width: output.width.filter(|_| is_video),
        height: output.height.filter(|_| is_video),
        duration: output.duration_ms(),
    }
}

/// A missing source whose destination exists is a redelivered notification.
fn is_copy_successful(copy: &LargeObjectCopyResult) -> bool {
    copy.status == LargeObjectStatus::Success
        || (copy.status == LargeObjectStatus::SourceNotFound && copy.destination_exists)
}
