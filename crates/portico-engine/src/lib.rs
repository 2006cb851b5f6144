//! Portico Ingest Engine
//!
//! Moves assets from customer origins into platform storage. Image assets go
//! through the external image processor, timebased assets through the
//! transcoder, and file-channel assets are stored as-is.
//!
//! # Flow
//!
//! An [`handlers::IngestHandler`] receives a queued request and hands it to the
//! [`ingest::AssetIngester`], which resolves the customer's origin strategy and
//! runs the workers for the asset's family. Timebased ingests finish later, when
//! the [`handlers::TranscodeCompleteHandler`] receives the transcoder's
//! notification and [`completion::TimebasedCompletion`] stores the outputs.

pub mod completion;
pub mod context;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod mover;
pub mod notification;
pub mod origin;
pub mod sender;
pub mod transcode;

pub use completion::{TimebasedBuckets, TimebasedCompletion};
pub use context::{AssetFromOrigin, IngestionContext, OriginResponse};
pub use error::IngestError;
pub use handlers::{IngestHandler, TranscodeCompleteHandler};
pub use ingest::{AssetIngester, IngestAssetRequest, IngestResult};
pub use notification::AssetNotificationSender;
pub use sender::IngestRequestSender;
