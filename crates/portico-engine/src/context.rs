//! Data carried between the stages of one ingest.

use portico_core::models::{Asset, AssetId, CustomerOriginStrategy, ImageLocation, ImageStorage};
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Bytes fetched from an origin. Consumed once by a mover.
pub struct OriginResponse {
    pub stream: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl OriginResponse {
    pub fn new(stream: Pin<Box<dyn AsyncRead + Send + Unpin>>) -> Self {
        Self {
            stream,
            content_type: None,
            content_length: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type.filter(|ct| !ct.trim().is_empty());
        self
    }

    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }
}

impl fmt::Debug for OriginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginResponse")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Result of moving an asset from its origin: where it landed and how big it is.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFromOrigin {
    pub asset_id: AssetId,
    pub asset_size: u64,
    /// Disk path or `s3://` uri.
    pub location: String,
    pub content_type: Option<String>,
    pub customer_origin_strategy: Option<CustomerOriginStrategy>,
    file_exceeds_allowance: bool,
}

impl AssetFromOrigin {
    pub fn new(
        asset_id: AssetId,
        asset_size: u64,
        location: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            asset_id,
            asset_size,
            location: location.into(),
            content_type,
            customer_origin_strategy: None,
            file_exceeds_allowance: false,
        }
    }

    /// Flag the asset as too large for the customer's storage policy.
    pub fn file_too_large(&mut self) {
        self.file_exceeds_allowance = true;
    }

    /// Only meaningful when the mover was asked to verify size.
    pub fn file_exceeds_allowance(&self) -> bool {
        self.file_exceeds_allowance
    }
}

/// Accumulates the state of one ingest attempt.
///
/// Each stage fills its own fields: the mover sets `asset_from_origin`, the
/// family worker sets `image_location` and `image_storage`.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    pub asset: Asset,
    pub asset_from_origin: Option<AssetFromOrigin>,
    pub image_location: Option<ImageLocation>,
    pub image_storage: Option<ImageStorage>,
}

impl IngestionContext {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            asset_from_origin: None,
            image_location: None,
            image_storage: None,
        }
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset.id
    }

    pub fn with_asset_from_origin(&mut self, asset_from_origin: AssetFromOrigin) -> &mut Self {
        self.asset_from_origin = Some(asset_from_origin);
        self
    }

    pub fn with_location(&mut self, location: ImageLocation) -> &mut Self {
        self.image_location = Some(location);
        self
    }

    pub fn with_storage(&mut self, storage: ImageStorage) -> &mut Self {
        self.image_storage = Some(storage);
        self
    }
}
