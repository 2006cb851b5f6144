//! Portico Core Library
//!
//! This crate provides the domain models, error types and configuration that are
//! shared by every part of the ingest engine.

pub mod config;
pub mod error;
pub mod mime;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, EngineConfig, QueueNames};
pub use error::AppError;
pub use models::{
    Asset, AssetFamily, AssetId, Batch, BatchOutcome, CustomerOriginStrategy, ImageLocation,
    ImageStorage, OriginStrategyType,
};
pub use storage_types::StorageBackend;
