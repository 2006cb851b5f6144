pub mod asset;
pub mod origin_strategy;
pub mod queue;
pub mod storage;
pub mod transcode_job;

pub use asset::{EngineAssetRepository, BATCH_NOT_FOUND_ERROR};
pub use origin_strategy::OriginStrategyRepository;
pub use queue::CustomerQueueRepository;
pub use storage::StorageRepository;
pub use transcode_job::TranscodeJobRepository;
