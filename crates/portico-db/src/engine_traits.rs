//! Repository traits the engine depends on
//!
//! These traits define the minimal interface the ingest engine needs from
//! repositories, allowing for easy mocking and testing without a database.

use anyhow::Result;
use async_trait::async_trait;
use portico_core::models::{
    Asset, AssetId, CustomerOriginStrategy, ImageLocation, ImageStorage, StorageAllowance,
};

use crate::db::{
    CustomerQueueRepository, EngineAssetRepository, OriginStrategyRepository, StorageRepository,
    TranscodeJobRepository,
};

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>>;

    /// Record ingest completion, see [`EngineAssetRepository::update_ingested_asset`].
    async fn update_ingested_asset(
        &self,
        asset: &mut Asset,
        location: Option<&ImageLocation>,
        storage: Option<&ImageStorage>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait OriginStrategyStore: Send + Sync {
    async fn get_customer_origin_strategies(
        &self,
        customer: i32,
    ) -> Result<Vec<CustomerOriginStrategy>>;
}

#[async_trait]
pub trait StorageMetricsStore: Send + Sync {
    async fn get_storage_allowance(&self, customer: i32) -> Result<Option<StorageAllowance>>;

    async fn get_asset_size(&self, id: &AssetId) -> Result<i64>;
}

#[async_trait]
pub trait QueueCounterStore: Send + Sync {
    async fn increment_size(&self, customer: i32, name: &str, amount: i32) -> Result<()>;

    async fn decrement_size(&self, customer: i32, name: &str, amount: i32) -> Result<()>;
}

#[async_trait]
pub trait TranscodeJobStore: Send + Sync {
    async fn record_job(&self, asset_id: &AssetId, job_id: &str) -> Result<()>;
}

// Implementations for concrete repository types

#[async_trait]
impl AssetStore for EngineAssetRepository {
    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>> {
        self.get_asset(id).await
    }

    async fn update_ingested_asset(
        &self,
        asset: &mut Asset,
        location: Option<&ImageLocation>,
        storage: Option<&ImageStorage>,
    ) -> Result<bool> {
        self.update_ingested_asset(asset, location, storage).await
    }
}

#[async_trait]
impl OriginStrategyStore for OriginStrategyRepository {
    async fn get_customer_origin_strategies(
        &self,
        customer: i32,
    ) -> Result<Vec<CustomerOriginStrategy>> {
        self.get_customer_origin_strategies(customer).await
    }
}

#[async_trait]
impl StorageMetricsStore for StorageRepository {
    async fn get_storage_allowance(&self, customer: i32) -> Result<Option<StorageAllowance>> {
        self.get_storage_allowance(customer).await
    }

    async fn get_asset_size(&self, id: &AssetId) -> Result<i64> {
        self.get_asset_size(id).await
    }
}

#[async_trait]
impl QueueCounterStore for CustomerQueueRepository {
    async fn increment_size(&self, customer: i32, name: &str, amount: i32) -> Result<()> {
        self.increment_size(customer, name, amount).await
    }

    async fn decrement_size(&self, customer: i32, name: &str, amount: i32) -> Result<()> {
        self.decrement_size(customer, name, amount).await
    }
}

#[async_trait]
impl TranscodeJobStore for TranscodeJobRepository {
    async fn record_job(&self, asset_id: &AssetId, job_id: &str) -> Result<()> {
        self.record_job(asset_id, job_id).await
    }
}
