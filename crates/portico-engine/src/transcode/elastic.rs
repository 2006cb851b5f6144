//! AWS Elastic Transcoder backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_elastictranscoder::error::SdkError;
use aws_sdk_elastictranscoder::types::{CreateJobOutput, JobInput};
use aws_sdk_elastictranscoder::Client;
use portico_core::models::TranscoderPreset;

use super::backend::{CreateJobRequest, CreateJobResponse, Page, Pipeline, TranscoderBackend};

/// Status Elastic Transcoder answers a created job with.
const JOB_CREATED: u16 = 201;
const AUTO: &str = "auto";

#[derive(Clone)]
pub struct ElasticTranscoderBackend {
    client: Client,
}

impl ElasticTranscoderBackend {
    pub async fn new(region: String, endpoint_url: Option<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_elastictranscoder::config::Region::new(region.clone()))
            .load()
            .await;

        let mut config = aws_sdk_elastictranscoder::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url.filter(|e| !e.is_empty()) {
            config = config.endpoint_url(endpoint);
        }

        tracing::info!(region = %region, "Elastic Transcoder client initialized");
        Self {
            client: Client::from_conf(config.build()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscoderBackend for ElasticTranscoderBackend {
    async fn list_pipelines(&self, page_token: Option<String>) -> Result<Page<Pipeline>> {
        let response = self
            .client
            .list_pipelines()
            .set_page_token(page_token)
            .send()
            .await
            .context("Failed to list transcoder pipelines")?;

        let items = response
            .pipelines()
            .iter()
            .filter_map(|p| {
                Some(Pipeline {
                    id: p.id()?.to_string(),
                    name: p.name()?.to_string(),
                })
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: response.next_page_token().map(String::from),
        })
    }

    async fn list_presets(&self, page_token: Option<String>) -> Result<Page<TranscoderPreset>> {
        let response = self
            .client
            .list_presets()
            .set_page_token(page_token)
            .send()
            .await
            .context("Failed to list transcoder presets")?;

        let items = response
            .presets()
            .iter()
            .filter_map(|p| {
                Some(TranscoderPreset {
                    id: p.id()?.to_string(),
                    name: p.name()?.to_string(),
                    extension: p.container().unwrap_or_default().to_string(),
                })
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: response.next_page_token().map(String::from),
        })
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<CreateJobResponse> {
        let input = JobInput::builder()
            .key(&request.input_key)
            .aspect_ratio(AUTO)
            .container(AUTO)
            .frame_rate(AUTO)
            .interlaced(AUTO)
            .resolution(AUTO)
            .build();
        let outputs = request
            .outputs
            .iter()
            .map(|o| CreateJobOutput::builder().key(&o.key).preset_id(&o.preset_id).build())
            .collect();

        let result = self
            .client
            .create_job()
            .pipeline_id(&request.pipeline_id)
            .input(input)
            .set_outputs(Some(outputs))
            .set_user_metadata(Some(request.metadata.clone()))
            .send()
            .await;

        match result {
            Ok(output) => Ok(CreateJobResponse {
                status_code: JOB_CREATED,
                job_id: output.job().and_then(|job| job.id()).map(String::from),
            }),
            Err(SdkError::ServiceError(err)) => {
                let status_code = err.raw().status().as_u16();
                tracing::warn!(status_code, error = ?err.err(), "Transcoder rejected job");
                Ok(CreateJobResponse {
                    status_code,
                    job_id: None,
                })
            }
            Err(e) => Err(anyhow::anyhow!("Failed to create transcode job: {e}")),
        }
    }
}
