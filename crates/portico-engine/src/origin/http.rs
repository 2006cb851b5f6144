use async_trait::async_trait;
use futures::TryStreamExt;
use portico_core::models::{AssetId, CustomerOriginStrategy, OriginStrategyType};
use reqwest::Client;
use std::io;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::credentials::BasicCredentials;
use super::OriginStrategy;
use crate::context::OriginResponse;
use crate::error::IngestError;

/// GET `origin`, following redirects. Failures are logged and reported as `Ok(None)`.
pub(crate) async fn fetch_over_http(
    client: &Client,
    asset_id: &AssetId,
    origin: &str,
    credentials: Option<&BasicCredentials>,
    cancel: &CancellationToken,
) -> Result<Option<OriginResponse>, IngestError> {
    let mut request = client.get(origin);
    if let Some(credentials) = credentials {
        request = request.basic_auth(&credentials.user, Some(&credentials.password));
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
        response = request.send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, asset_id = %asset_id, origin, "Error fetching asset from origin");
            return Ok(None);
        }
    };

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(
            asset_id = %asset_id,
            origin,
            status = status.as_u16(),
            "Origin responded with non-success status"
        );
        return Ok(None);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let content_length = response.content_length();

    let stream = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

    Ok(Some(
        OriginResponse::new(Box::pin(StreamReader::new(Box::pin(stream))))
            .with_content_type(content_type)
            .with_content_length(content_length),
    ))
}

/// Plain HTTP(S) origin.
#[derive(Clone)]
pub struct DefaultOriginStrategy {
    client: Client,
}

impl DefaultOriginStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OriginStrategy for DefaultOriginStrategy {
    fn strategy(&self) -> OriginStrategyType {
        OriginStrategyType::Default
    }

    async fn load_asset_from_origin(
        &self,
        asset_id: &AssetId,
        origin: &str,
        _customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError> {
        tracing::debug!(asset_id = %asset_id, origin, "Fetching asset from origin");
        fetch_over_http(&self.client, asset_id, origin, None, cancel).await
    }
}
