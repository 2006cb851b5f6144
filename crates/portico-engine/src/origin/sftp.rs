use async_trait::async_trait;
use portico_core::models::{AssetId, CustomerOriginStrategy, OriginStrategyType};
use tokio_util::sync::CancellationToken;

use super::OriginStrategy;
use crate::context::OriginResponse;
use crate::error::IngestError;

/// Placeholder for SFTP origins. Every fetch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpOriginStrategy;

#[async_trait]
impl OriginStrategy for SftpOriginStrategy {
    fn strategy(&self) -> OriginStrategyType {
        OriginStrategyType::Sftp
    }

    async fn load_asset_from_origin(
        &self,
        asset_id: &AssetId,
        origin: &str,
        _customer_origin_strategy: &CustomerOriginStrategy,
        _cancel: &CancellationToken,
    ) -> Result<Option<OriginResponse>, IngestError> {
        tracing::error!(asset_id = %asset_id, origin, "SFTP origins are not supported");
        Err(IngestError::UnsupportedStrategy(OriginStrategyType::Sftp))
    }
}
