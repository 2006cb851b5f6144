use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::AppError;

/// Delivery channel names an asset can request.
pub mod channels {
    pub const IMAGE: &str = "iiif-img";
    pub const THUMBNAILS: &str = "thumbs";
    pub const TIMEBASED: &str = "iiif-av";
    pub const FILE: &str = "file";
}

/// Identity of an asset: customer, space and the asset's own name.
///
/// Serialized as the path form `{customer}/{space}/{asset}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId {
    pub customer: i32,
    pub space: i32,
    pub asset: String,
}

impl AssetId {
    pub fn new(customer: i32, space: i32, asset: impl Into<String>) -> Self {
        Self {
            customer,
            space,
            asset: asset.into(),
        }
    }

    /// Path form used for storage keys and transcoder outputs.
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}/{}", self.customer, self.space, self.asset)
    }
}

impl FromStr for AssetId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidInput(format!("Invalid asset id: {}", s));
        let mut parts = s.splitn(3, '/');
        let customer = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let space = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let asset = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        Ok(AssetId::new(customer, space, asset))
    }
}

impl TryFrom<String> for AssetId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text"))]
pub enum AssetFamily {
    #[serde(rename = "I")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "I"))]
    Image,
    #[serde(rename = "T")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "T"))]
    Timebased,
    #[serde(rename = "F")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "F"))]
    File,
}

impl Display for AssetFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetFamily::Image => write!(f, "I"),
            AssetFamily::Timebased => write!(f, "T"),
            AssetFamily::File => write!(f, "F"),
        }
    }
}

impl FromStr for AssetFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(AssetFamily::Image),
            "T" => Ok(AssetFamily::Timebased),
            "F" => Ok(AssetFamily::File),
            _ => Err(anyhow::anyhow!("Invalid asset family: {}", s)),
        }
    }
}

/// Policy attached to a delivery channel. For `iiif-av` the policy data is a
/// JSON array of named transcode presets, e.g. `["video-mp4-720p"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryChannelPolicy {
    pub id: i32,
    pub name: String,
    pub channel: String,
    #[serde(default)]
    pub policy_data: Option<String>,
}

impl DeliveryChannelPolicy {
    /// Named presets requested by a timebased policy. Unparseable data yields none.
    pub fn timebased_presets(&self) -> Vec<String> {
        self.policy_data
            .as_deref()
            .and_then(|data| serde_json::from_str::<Vec<String>>(data).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDeliveryChannel {
    pub channel: String,
    #[serde(default)]
    pub policy: Option<DeliveryChannelPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailPolicy {
    pub id: String,
    #[serde(default)]
    pub sizes: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOptimisationPolicy {
    pub id: String,
    #[serde(default)]
    pub technical_details: Vec<String>,
}

impl ImageOptimisationPolicy {
    pub const USE_ORIGINAL: &'static str = "use-original";

    pub fn is_use_original(&self) -> bool {
        self.technical_details
            .iter()
            .any(|detail| detail == Self::USE_ORIGINAL)
    }
}

/// Kinds of application metadata the engine writes against an asset.
pub mod metadata_types {
    /// The stored renditions of a timebased asset.
    pub const AV_TRANSCODES: &str = "AVTranscodes";
}

/// A typed JSON document stored alongside an asset, one per `metadata_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetApplicationMetadata {
    pub metadata_type: String,
    pub metadata_value: String,
}

/// An asset as seen by the ingest pipeline. Only the fields the pipeline reads or
/// writes are carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub origin: String,
    #[serde(default)]
    pub media_type: String,
    pub family: AssetFamily,
    #[serde(default)]
    pub delivery_channels: Vec<ImageDeliveryChannel>,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub ingesting: bool,
    #[serde(default)]
    pub batch: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    /// Duration in milliseconds, timebased assets only.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail_policy: Option<ThumbnailPolicy>,
    #[serde(default)]
    pub image_optimisation_policy: Option<ImageOptimisationPolicy>,
    #[serde(default)]
    pub application_metadata: Vec<AssetApplicationMetadata>,
}

impl Asset {
    pub fn new(id: AssetId, origin: impl Into<String>, family: AssetFamily) -> Self {
        Self {
            id,
            origin: origin.into(),
            media_type: String::new(),
            family,
            delivery_channels: Vec::new(),
            error: String::new(),
            ingesting: false,
            batch: None,
            width: None,
            height: None,
            duration: None,
            created: None,
            finished: None,
            thumbnail_policy: None,
            image_optimisation_policy: None,
            application_metadata: Vec::new(),
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn has_delivery_channel(&self, channel: &str) -> bool {
        self.delivery_channels.iter().any(|dc| dc.channel == channel)
    }

    pub fn timebased_channel(&self) -> Option<&ImageDeliveryChannel> {
        self.delivery_channels
            .iter()
            .find(|dc| dc.channel == channels::TIMEBASED)
    }

    /// Set the metadata of `metadata_type`, replacing any existing value.
    pub fn upsert_application_metadata(&mut self, metadata_type: &str, value: String) {
        match self
            .application_metadata
            .iter_mut()
            .find(|m| m.metadata_type == metadata_type)
        {
            Some(existing) => existing.metadata_value = value,
            None => self.application_metadata.push(AssetApplicationMetadata {
                metadata_type: metadata_type.to_string(),
                metadata_value: value,
            }),
        }
    }

    /// Reset the fields an ingest attempt owns before it starts.
    pub fn mark_ingest_started(&mut self) {
        self.error.clear();
        self.ingesting = true;
        self.finished = None;
    }
}
