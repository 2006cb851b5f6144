use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Keys of the user metadata attached to a transcode job and echoed back in its
/// completion notification.
pub mod metadata_keys {
    pub const ASSET_ID: &str = "dlcsId";
    pub const START_TIME: &str = "startTime";
    pub const JOB_ID: &str = "jobId";
    pub const BATCH_ID: &str = "batchId";
    pub const ORIGIN_SIZE: &str = "originSize";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TranscodeState {
    Progressing,
    Completed,
    Warning,
    Error,
    #[serde(other)]
    Unknown,
}

impl Display for TranscodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TranscodeState::Progressing => write!(f, "PROGRESSING"),
            TranscodeState::Completed => write!(f, "COMPLETED"),
            TranscodeState::Warning => write!(f, "WARNING"),
            TranscodeState::Error => write!(f, "ERROR"),
            TranscodeState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One requested output of a transcode job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeOutput {
    pub id: String,
    pub preset_id: String,
    pub key: String,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Whole seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub duration_millis: Option<i64>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

impl TranscodeOutput {
    pub fn is_complete(&self) -> bool {
        self.status.eq_ignore_ascii_case("complete")
    }

    /// Duration in milliseconds, preferring the precise value.
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_millis
            .or_else(|| self.duration.map(|secs| secs * 1000))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeInput {
    pub key: String,
}

/// Completion notification published by the transcoder once a job ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscoderNotification {
    pub state: TranscodeState,
    #[serde(default)]
    pub version: Option<String>,
    pub job_id: String,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub input: TranscodeInput,
    #[serde(default)]
    pub error_code: Option<i32>,
    #[serde(default)]
    pub output_key_prefix: Option<String>,
    #[serde(default)]
    pub outputs: Vec<TranscodeOutput>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
}

/// Parsed outcome of a transcode job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeResult {
    pub job_id: String,
    pub input_key: String,
    pub state: TranscodeState,
    pub error_code: Option<i32>,
    pub outputs: Vec<TranscodeOutput>,
    pub user_metadata: HashMap<String, String>,
}

impl TranscodeResult {
    pub fn is_complete(&self) -> bool {
        self.state == TranscodeState::Completed
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).map(String::as_str)
    }
}

impl From<TranscoderNotification> for TranscodeResult {
    fn from(notification: TranscoderNotification) -> Self {
        Self {
            job_id: notification.job_id,
            input_key: notification.input.key,
            state: notification.state,
            error_code: notification.error_code,
            outputs: notification.outputs,
            user_metadata: notification.user_metadata,
        }
    }
}

/// One stored rendition of a timebased asset, as recorded in the asset's
/// `AVTranscodes` application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvTranscode {
    /// s3 uri of the stored rendition.
    #[serde(rename = "l")]
    pub location: String,
    /// Name of the transcoder preset that produced it.
    #[serde(rename = "n")]
    pub transcode_name: String,
    #[serde(rename = "ex")]
    pub extension: String,
    #[serde(rename = "mt")]
    pub media_type: String,
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(rename = "h", default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    /// Milliseconds.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// A transcoder preset as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscoderPreset {
    pub id: String,
    pub name: String,
    pub extension: String,
}
