use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Id of the strategy used when nothing the customer configured matches.
pub const DEFAULT_STRATEGY_ID: &str = "_default_";
/// Id of the strategy used for origins inside the platform's own storage.
pub const PORTAL_STRATEGY_ID: &str = "_default_portal_";
/// Order given to the portal strategy so configured strategies always win.
pub const PORTAL_STRATEGY_ORDER: i32 = 999;

/// How the bytes of an origin are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "kebab-case"))]
#[serde(rename_all = "kebab-case")]
pub enum OriginStrategyType {
    /// Plain HTTP(S) GET.
    Default,
    /// HTTP(S) GET with a basic-auth header.
    BasicHttp,
    /// Object in a bucket readable with the engine's ambient credentials.
    S3Ambient,
    Sftp,
}

/// Static capabilities of an origin strategy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginCapabilities {
    /// Origin bytes already live in a bucket the engine can copy from directly.
    pub bucket_resident: bool,
}

impl OriginStrategyType {
    pub fn capabilities(&self) -> OriginCapabilities {
        OriginCapabilities {
            bucket_resident: matches!(self, OriginStrategyType::S3Ambient),
        }
    }
}

impl Display for OriginStrategyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OriginStrategyType::Default => write!(f, "default"),
            OriginStrategyType::BasicHttp => write!(f, "basic-http"),
            OriginStrategyType::S3Ambient => write!(f, "s3-ambient"),
            OriginStrategyType::Sftp => write!(f, "sftp"),
        }
    }
}

impl FromStr for OriginStrategyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(OriginStrategyType::Default),
            "basic-http" => Ok(OriginStrategyType::BasicHttp),
            "s3-ambient" => Ok(OriginStrategyType::S3Ambient),
            "sftp" => Ok(OriginStrategyType::Sftp),
            _ => Err(anyhow::anyhow!("Invalid origin strategy: {}", s)),
        }
    }
}

/// A customer's rule for reaching origins that match `regex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOriginStrategy {
    pub id: String,
    pub customer: i32,
    pub regex: String,
    pub strategy: OriginStrategyType,
    /// Reference to stored credentials, basic-auth strategies only.
    #[serde(default)]
    pub credentials: Option<String>,
    /// Bytes at the origin are already in a form the platform can serve.
    #[serde(default)]
    pub optimised: bool,
    #[serde(default)]
    pub order: i32,
}

impl CustomerOriginStrategy {
    /// Strategy used when no configured strategy matches an origin.
    pub fn default_for(customer: i32) -> Self {
        Self {
            id: DEFAULT_STRATEGY_ID.to_string(),
            customer,
            regex: String::new(),
            strategy: OriginStrategyType::Default,
            credentials: None,
            optimised: false,
            order: 0,
        }
    }

    /// Strategy for origins in the platform's own storage bucket.
    pub fn portal_for(customer: i32, regex: impl Into<String>) -> Self {
        Self {
            id: PORTAL_STRATEGY_ID.to_string(),
            customer,
            regex: regex.into(),
            strategy: OriginStrategyType::S3Ambient,
            credentials: None,
            optimised: true,
            order: PORTAL_STRATEGY_ORDER,
        }
    }

    /// Whether origin bytes can be copied bucket-to-bucket without a local download.
    pub fn allows_direct_bucket_copy(&self) -> bool {
        self.strategy.capabilities().bucket_resident && self.optimised
    }

    /// Whether this strategy's regex matches `origin`, ignoring case.
    pub fn matches(&self, origin: &str) -> Result<bool, regex::Error> {
        Ok(RegexBuilder::new(&self.regex)
            .case_insensitive(true)
            .build()?
            .is_match(origin))
    }
}
