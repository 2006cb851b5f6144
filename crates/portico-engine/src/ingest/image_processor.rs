use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request to the external derivative generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessorRequest {
    pub job_id: String,
    pub source: String,
    pub destination: String,
    pub thumb_dir: String,
    pub thumb_sizes: Vec<u32>,
    pub optimisation: String,
    pub image_id: String,
    pub origin: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedThumb {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessorResponse {
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub thumbs: Vec<ProcessedThumb>,
}

#[derive(Debug, Deserialize)]
struct ImageProcessorError {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the image processor's `convert` endpoint.
#[derive(Clone)]
pub struct ImageProcessorClient {
    client: Client,
    base_url: String,
}

impl ImageProcessorClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn convert(&self, request: &ImageProcessorRequest) -> Result<ImageProcessorResponse> {
        let start = std::time::Instant::now();
        tracing::info!(image_id = %request.image_id, job_id = %request.job_id, "Calling image processor");

        let response = self
            .client
            .post(format!("{}/convert", self.base_url))
            .json(request)
            .send()
            .await
            .context("Failed to call image processor")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ImageProcessorError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Unknown response from image processor".to_string());
            anyhow::bail!("Image processor returned {}: {}", status.as_u16(), message);
        }

        let body = response
            .json::<ImageProcessorResponse>()
            .await
            .context("Failed to parse image processor response")?;
        tracing::debug!(
            image_id = %request.image_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            thumbs = body.thumbs.len(),
            "Image processor finished"
        );
        Ok(body)
    }
}
