use portico_core::models::OriginStrategyType;
use portico_storage::StorageError;
use thiserror::Error;

/// Failures that abort an ingest attempt.
///
/// Expected outcomes (an unreachable origin, a file over the storage allowance, a
/// rejected transcode job) are not errors; they are reported through return values.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No origin strategy implementation registered for '{strategy}' (strategy id: {id})")]
    StrategyNotRegistered {
        strategy: OriginStrategyType,
        id: String,
    },

    #[error("Origin strategy '{implementation}' cannot serve '{requested}' (strategy id: {id})")]
    StrategyMismatch {
        implementation: OriginStrategyType,
        requested: OriginStrategyType,
        id: String,
    },

    #[error("Origin strategy '{0}' is not supported")]
    UnsupportedStrategy(OriginStrategyType),

    #[error("Unable to get credentials for origin strategy '{0}'")]
    MissingCredentials(String),

    #[error("Unable to get asset '{asset_id}' from origin '{origin}'")]
    OriginUnavailable { asset_id: String, origin: String },

    #[error("Unable to parse origin '{0}' as a bucket object")]
    InvalidBucketOrigin(String),

    #[error("Failed to copy asset '{asset_id}' to {destination}: {reason}")]
    BucketWriteFailed {
        asset_id: String,
        destination: String,
        reason: String,
    },

    #[error("Ingest cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
