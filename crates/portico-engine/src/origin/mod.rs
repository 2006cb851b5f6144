//! Fetching asset bytes from customer origins.

mod basic_auth;
mod credentials;
mod http;
mod resolver;
mod s3_ambient;
mod sftp;

pub use basic_auth::BasicHttpAuthOriginStrategy;
pub use credentials::{BasicCredentials, BucketCredentialsProvider, CredentialsProvider};
pub use http::DefaultOriginStrategy;
pub use resolver::OriginStrategyResolver;
pub use s3_ambient::S3AmbientOriginStrategy;
pub use sftp::SftpOriginStrategy;

use async_trait::async_trait;
use portico_core::models::{AssetId, CustomerOriginStrategy, OriginStrategyType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::OriginResponse;
use crate::error::IngestError;

/// One way of reaching an origin.
///
/// `Ok(None)` means the origin could not be read (bad status, transport failure,
/// no content). `Err` is reserved for misconfiguration and cancellation.
#[async_trait]
pub trait OriginStrategy: Send + Sync {
    fn strategy(&self) -> OriginStrategyType;

    async fn load_asset_from_origin(
        &self,
        asset_id: &AssetId,
        origin: &str,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError>;
}

/// Registered origin strategies, looked up by strategy type.
#[derive(Clone, Default)]
pub struct OriginFetcher {
    strategies: HashMap<OriginStrategyType, Arc<dyn OriginStrategy>>,
}

impl OriginFetcher {
    pub fn new(strategies: Vec<Arc<dyn OriginStrategy>>) -> Self {
        let mut fetcher = Self::default();
        for strategy in strategies {
            fetcher = fetcher.register(strategy.strategy(), strategy);
        }
        fetcher
    }

    pub fn register(mut self, strategy_type: OriginStrategyType, strategy: Arc<dyn OriginStrategy>) -> Self {
        self.strategies.insert(strategy_type, strategy);
        self
    }

    /// Fetch `origin` with the implementation registered for the customer's strategy.
    pub async fn fetch(
        &self,
        asset_id: &AssetId,
        origin: &str,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError> {
        let implementation = self
            .strategies
            .get(&customer_origin_strategy.strategy)
            .ok_or_else(|| IngestError::StrategyNotRegistered {
                strategy: customer_origin_strategy.strategy,
                id: customer_origin_strategy.id.clone(),
            })?;

        load_verified(implementation.as_ref(), asset_id, origin, customer_origin_strategy, cancel).await
    }
}

/// Delegate to `implementation` after checking it serves the requested strategy type.
pub async fn load_verified(
    implementation: &dyn OriginStrategy,
    asset_id: &AssetId,
    origin: &str,
    customer_origin_strategy: &CustomerOriginStrategy,
    cancel: &CancellationToken,
) -> Result<Option<OriginResponse>, IngestError> {
    if implementation.strategy() != customer_origin_strategy.strategy {
        tracing::error!(
            asset_id = %asset_id,
            implementation = %implementation.strategy(),
            requested = %customer_origin_strategy.strategy,
            "Origin strategy implementation does not match customer origin strategy"
        );
        return Err(IngestError::StrategyMismatch {
            implementation: implementation.strategy(),
            requested: customer_origin_strategy.strategy,
            id: customer_origin_strategy.id.clone(),
        });
    }

    implementation
        .load_asset_from_origin(asset_id, origin, customer_origin_strategy, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    struct StaticStrategy(OriginStrategyType);

    #[async_trait]
    impl OriginStrategy for StaticStrategy {
        fn strategy(&self) -> OriginStrategyType {
            self.0
        }

        async fn load_asset_from_origin(
            &self,
            _asset_id: &AssetId,
            _origin: &str,
            _customer_origin_strategy: &CustomerOriginStrategy,
            _cancel: &CancellationToken,
        ) -> Result<Option<OriginResponse>, IngestError> {
            Ok(Some(OriginResponse::new(Box::pin(std::io::Cursor::new(b"bytes".to_vec())))))
        }
    }

    #[tokio::test]
    async fn test_fetch_uses_registered_strategy() {
        let fetcher = OriginFetcher::new(vec![Arc::new(StaticStrategy(OriginStrategyType::Default))]);
        let response = fetcher
            .fetch(
                &AssetId::new(1, 1, "a"),
                "https://example.org/a",
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut body = Vec::new();
        response.unwrap().stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"bytes");
    }

    #[tokio::test]
    async fn test_fetch_without_registration_is_an_error() {
        let fetcher = OriginFetcher::default();
        let result = fetcher
            .fetch(
                &AssetId::new(1, 1, "a"),
                "https://example.org/a",
                &CustomerOriginStrategy::default_for(1),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(IngestError::StrategyNotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_mismatched_registration_is_a_hard_failure() {
        let fetcher = OriginFetcher::default().register(
            OriginStrategyType::BasicHttp,
            Arc::new(StaticStrategy(OriginStrategyType::Default)),
        );
        let mut strategy = CustomerOriginStrategy::default_for(1);
        strategy.strategy = OriginStrategyType::BasicHttp;

        let result = fetcher
            .fetch(
                &AssetId::new(1, 1, "a"),
                "https://example.org/a",
                &strategy,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(IngestError::StrategyMismatch {
                implementation: OriginStrategyType::Default,
                requested: OriginStrategyType::BasicHttp,
                ..
            })
        ));
    }
}
