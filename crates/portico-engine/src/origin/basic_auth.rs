use async_trait::async_trait;
use portico_core::models::{AssetId, CustomerOriginStrategy, OriginStrategyType};
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::credentials::CredentialsProvider;
use super::http::fetch_over_http;
use super::OriginStrategy;
use crate::context::OriginResponse;
use crate::error::IngestError;

/// HTTP(S) origin requiring a basic-auth header.
pub struct BasicHttpAuthOriginStrategy {
    client: Client,
    credentials: Arc<dyn CredentialsProvider>,
}

impl BasicHttpAuthOriginStrategy {
    pub fn new(client: Client, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self { client, credentials }
    }
}

#[async_trait]
impl OriginStrategy for BasicHttpAuthOriginStrategy {
    fn strategy(&self) -> OriginStrategyType {
        OriginStrategyType::BasicHttp
    }

    async fn load_asset_from_origin(
        &self,
        asset_id: &AssetId,
        origin: &str,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError> {
        let credentials = self
            .credentials
            .get_basic_credentials(customer_origin_strategy)
            .await
            .ok_or_else(|| {
                tracing::error!(
                    asset_id = %asset_id,
                    strategy_id = %customer_origin_strategy.id,
                    "Basic auth credentials not found"
                );
                IngestError::MissingCredentials(customer_origin_strategy.id.clone())
            })?;

        tracing::debug!(asset_id = %asset_id, origin, "Fetching asset from origin with basic auth");
        fetch_over_http(&self.client, asset_id, origin, Some(&credentials), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::BasicCredentials;

    struct FixedCredentials(Option<BasicCredentials>);

    #[async_trait]
    impl CredentialsProvider for FixedCredentials {
        async fn get_basic_credentials(&self, _: &CustomerOriginStrategy) -> Option<BasicCredentials> {
            self.0.clone()
        }
    }

    fn basic_strategy() -> CustomerOriginStrategy {
        let mut strategy = CustomerOriginStrategy::default_for(2);
        strategy.id = "secured".to_string();
        strategy.strategy = OriginStrategyType::BasicHttp;
        strategy
    }

    #[tokio::test]
    async fn test_sends_basic_auth_header() {
        let mut server = mockito::Server::new_async().await;
        // "user:pass"
        let mock = server
            .mock("GET", "/secure.tif")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body("tiff")
            .create_async()
            .await;

        let strategy = BasicHttpAuthOriginStrategy::new(
            Client::new(),
            Arc::new(FixedCredentials(Some(BasicCredentials {
                user: "user".to_string(),
                password: "pass".to_string(),
            }))),
        );
        let response = strategy
            .load_asset_from_origin(
                &AssetId::new(2, 1, "secure"),
                &format!("{}/secure.tif", server.url()),
                &basic_strategy(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(response.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credentials_is_a_hard_stop() {
        let strategy = BasicHttpAuthOriginStrategy::new(Client::new(), Arc::new(FixedCredentials(None)));
        let result = strategy
            .load_asset_from_origin(
                &AssetId::new(2, 1, "secure"),
                "https://example.org/secure.tif",
                &basic_strategy(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::MissingCredentials(id)) if id == "secured"));
    }
}
