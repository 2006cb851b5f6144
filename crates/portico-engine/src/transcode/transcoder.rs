use anyhow::Result;
use chrono::Utc;
use portico_core::models::metadata_keys;
use portico_db::TranscodeJobStore;
use portico_storage::ObjectInBucket;
use std::collections::HashMap;
use std::sync::Arc;

use super::backend::{CreateJobRequest, JobOutputRequest, TranscoderLookup};
use super::templates;
use crate::context::IngestionContext;

pub const PIPELINE_NOT_FOUND_ERROR: &str = "Could not find transcoder pipeline/queue";
pub const NO_OUTPUTS_ERROR: &str = "Unable to generate transcoder outputs";

#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    pub pipeline_name: String,
    /// Delivery-channel policy name -> transcoder preset name.
    pub preset_mappings: HashMap<String, String>,
}

/// Submits timebased assets to the transcoding backend.
pub struct Transcoder {
    lookup: Arc<TranscoderLookup>,
    jobs: Arc<dyn TranscodeJobStore>,
    settings: TranscoderSettings,
}

impl Transcoder {
    pub fn new(lookup: Arc<TranscoderLookup>, jobs: Arc<dyn TranscodeJobStore>, settings: TranscoderSettings) -> Self {
        Self { lookup, jobs, settings }
    }

    /// Start a transcode of the asset the context's mover placed in the input bucket.
    ///
    /// Returns `Ok(false)` with `asset.error` set when the job cannot be created.
    /// `Err` only when the backend cannot be reached.
    #[tracing::instrument(skip(self, context, metadata), fields(asset_id = %context.asset.id))]
    pub async fn submit(&self, context: &mut IngestionContext, metadata: HashMap<String, String>) -> Result<bool> {
        let Some(pipeline_id) = self.lookup.get_pipeline_id(&self.settings.pipeline_name).await? else {
            tracing::warn!(
                pipeline = %self.settings.pipeline_name,
                asset_id = %context.asset.id,
                "Transcoder pipeline not found"
            );
            context.asset.error = PIPELINE_NOT_FOUND_ERROR.to_string();
            return Ok(false);
        };

        let job_id = uuid::Uuid::new_v4().to_string();
        let outputs = self.job_outputs(context, &job_id).await?;
        if outputs.is_empty() {
            context.asset.error = NO_OUTPUTS_ERROR.to_string();
            return Ok(false);
        }

        let mut metadata = metadata;
        metadata
            .entry(metadata_keys::ASSET_ID.to_string())
            .or_insert_with(|| context.asset.id.to_string());
        metadata.insert(metadata_keys::JOB_ID.to_string(), job_id.clone());
        metadata.insert(metadata_keys::START_TIME.to_string(), Utc::now().timestamp().to_string());

        let request = CreateJobRequest {
            input_key: input_key(context),
            pipeline_id,
            outputs,
            metadata,
        };
        let response = self.lookup.backend().create_job(&request).await?;

        tracing::debug!(
            asset_id = %context.asset.id,
            transcode_job_id = ?response.job_id,
            status_code = response.status_code,
            "Created transcode job"
        );

        if !response.is_success() {
            context.asset.error = format!("Create transcode job failed with status {}", response.status_code);
            return Ok(false);
        }

        if let Some(transcode_job_id) = response.job_id.as_deref() {
            if let Err(e) = self.jobs.record_job(&context.asset.id, transcode_job_id).await {
                tracing::warn!(error = %e, asset_id = %context.asset.id, "Failed to record transcode job id");
            }
        }
        context.asset.error.clear();
        Ok(true)
    }

    async fn job_outputs(&self, context: &IngestionContext, job_id: &str) -> Result<Vec<JobOutputRequest>> {
        let asset = &context.asset;
        let policies = asset
            .timebased_channel()
            .and_then(|channel| channel.policy.as_ref())
            .map(|policy| policy.timebased_presets())
            .unwrap_or_default();

        let mapped: Vec<(&str, &str)> = policies
            .iter()
            .filter_map(|policy| match self.settings.preset_mappings.get(policy) {
                Some(preset) => Some((policy.as_str(), preset.as_str())),
                None => {
                    tracing::warn!(policy = %policy, "Timebased policy has no preset mapping");
                    None
                }
            })
            .collect();
        if mapped.is_empty() {
            return Ok(Vec::new());
        }

        let required: Vec<&str> = mapped.iter().map(|(_, preset)| *preset).collect();
        let presets = self.lookup.get_presets_by_name(&required).await?;
        let media_type = media_type(context);

        let mut outputs = Vec::with_capacity(mapped.len());
        for (policy, preset_name) in mapped {
            let Some(preset) = presets.get(preset_name) else {
                tracing::warn!(preset = preset_name, "Transcoder preset not found");
                continue;
            };
            let extension = policy_extension(policy).unwrap_or(preset.extension.as_str());
            let Some(key) = templates::process_preset(media_type, &asset.id, job_id, extension) else {
                tracing::warn!(asset_id = %asset.id, media_type, "No output template for media type");
                continue;
            };

            tracing::debug!(asset_id = %asset.id, destination = %key, policy, "Adding transcode output");
            outputs.push(JobOutputRequest {
                preset_id: preset.id.clone(),
                key,
            });
        }
        Ok(outputs)
    }
}

/// Container named by a timebased policy, e.g. `mp4` for `video-mp4-720p`.
fn policy_extension(policy: &str) -> Option<&str> {
    policy.split('-').nth(1).filter(|ext| !ext.is_empty())
}

fn media_type(context: &IngestionContext) -> &str {
    if !context.asset.media_type.is_empty() {
        return &context.asset.media_type;
    }
    context
        .asset_from_origin
        .as_ref()
        .and_then(|a| a.content_type.as_deref())
        .unwrap_or_default()
}

fn input_key(context: &IngestionContext) -> String {
    let location = context
        .asset_from_origin
        .as_ref()
        .map(|a| a.location.as_str())
        .unwrap_or_default();
    ObjectInBucket::parse(location).map_or_else(|| location.to_string(), |object| object.key)
}
