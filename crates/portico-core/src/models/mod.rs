//! Data models for the ingest pipeline
//!
//! Each sub-module covers one part of the domain: assets, batches, origin
//! strategies, storage records and transcoding.

mod asset;
mod batch;
mod origin;
mod storage;
mod transcode;

pub use asset::*;
pub use batch::*;
pub use origin::*;
pub use storage::*;
pub use transcode::*;
