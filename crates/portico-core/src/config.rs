//! Configuration module
//!
//! Engine configuration is read from the environment (optionally seeded from a
//! `.env` file). Every value has a default so a development engine starts with
//! nothing but `DATABASE_URL` set.

use std::collections::HashMap;
use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const QUEUE_WAIT_TIME_SECS: i32 = 20;
const QUEUE_MAX_MESSAGES: i32 = 10;
const ORIGIN_STRATEGY_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_REGION: &str = "eu-west-1";
const DEFAULT_SCRATCH_ROOT: &str = "/tmp/portico";
const DEFAULT_IMAGE_PROCESSOR_URL: &str = "http://localhost:5080";

/// Names of the queues the engine listens to. An unset queue is not listened to.
#[derive(Clone, Debug, Default)]
pub struct QueueNames {
    pub image: Option<String>,
    pub priority_image: Option<String>,
    pub timebased: Option<String>,
    pub file: Option<String>,
    pub transcode_complete: Option<String>,
    /// Outbound queue for asset-modified notifications.
    pub notification: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub environment: String,
    pub log_format: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub aws_region: String,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers
    pub local_storage_path: Option<String>,
    pub storage_bucket: String,
    pub thumbs_bucket: String,
    pub timebased_input_bucket: String,
    pub timebased_output_bucket: String,
    /// Root of the scratch folders assets are downloaded to before processing.
    pub scratch_root: String,
    pub image_processor_url: String,
    // Queues
    pub queues: QueueNames,
    pub queue_wait_time_secs: i32,
    pub queue_max_messages: i32,
    // Transcoding
    pub transcoder_pipeline_name: String,
    /// Delivery-channel policy name -> transcoder preset name.
    pub transcoder_preset_mappings: HashMap<String, String>,
    /// Customers whose ingests skip the storage allowance check.
    pub customers_without_storage_check: Vec<i32>,
    /// How long a customer's origin strategies are reused before reloading.
    pub origin_strategy_cache_ttl_secs: u64,
}

/// Application configuration (engine).
#[derive(Clone, Debug)]
pub struct Config(pub Box<EngineConfig>);

impl Config {
    fn as_engine(&self) -> &EngineConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = EngineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_engine().validate()
    }

    pub fn is_production(&self) -> bool {
        let env = self.as_engine().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.as_engine().environment
    }

    pub fn log_format(&self) -> &str {
        &self.as_engine().log_format
    }

    pub fn database_url(&self) -> &str {
        &self.as_engine().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_engine().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_engine().db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_engine().storage_backend
    }

    pub fn aws_region(&self) -> &str {
        &self.as_engine().aws_region
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_engine().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_engine().local_storage_path.as_deref()
    }

    pub fn storage_bucket(&self) -> &str {
        &self.as_engine().storage_bucket
    }

    pub fn thumbs_bucket(&self) -> &str {
        &self.as_engine().thumbs_bucket
    }

    pub fn timebased_input_bucket(&self) -> &str {
        &self.as_engine().timebased_input_bucket
    }

    pub fn timebased_output_bucket(&self) -> &str {
        &self.as_engine().timebased_output_bucket
    }

    pub fn scratch_root(&self) -> &str {
        &self.as_engine().scratch_root
    }

    pub fn image_processor_url(&self) -> &str {
        &self.as_engine().image_processor_url
    }

    pub fn queues(&self) -> &QueueNames {
        &self.as_engine().queues
    }

    pub fn queue_wait_time_secs(&self) -> i32 {
        self.as_engine().queue_wait_time_secs
    }

    pub fn queue_max_messages(&self) -> i32 {
        self.as_engine().queue_max_messages
    }

    pub fn transcoder_pipeline_name(&self) -> &str {
        &self.as_engine().transcoder_pipeline_name
    }

    pub fn transcoder_preset_mappings(&self) -> &HashMap<String, String> {
        &self.as_engine().transcoder_preset_mappings
    }

    pub fn customers_without_storage_check(&self) -> &[i32] {
        &self.as_engine().customers_without_storage_check
    }

    pub fn origin_strategy_cache_ttl_secs(&self) -> u64 {
        self.as_engine().origin_strategy_cache_ttl_secs
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `policy=preset name;policy2=other preset` into a lookup.
pub fn parse_preset_mappings(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (policy, preset) = pair.split_once('=')?;
            let (policy, preset) = (policy.trim(), preset.trim());
            (!policy.is_empty() && !preset.is_empty())
                .then(|| (policy.to_string(), preset.to_string()))
        })
        .collect()
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
            .parse()
            .unwrap_or(MAX_CONNECTIONS);

        let db_timeout_seconds = env::var("DB_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(CONNECTION_TIMEOUT_SECS);

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .parse::<StorageBackend>()?;

        let storage_bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| "portico-storage".to_string());

        let queue_wait_time_secs = env::var("QUEUE_WAIT_TIME_SECS")
            .unwrap_or_else(|_| QUEUE_WAIT_TIME_SECS.to_string())
            .parse()
            .unwrap_or(QUEUE_WAIT_TIME_SECS);

        let queue_max_messages = env::var("QUEUE_MAX_MESSAGES")
            .unwrap_or_else(|_| QUEUE_MAX_MESSAGES.to_string())
            .parse()
            .unwrap_or(QUEUE_MAX_MESSAGES);

        let transcoder_preset_mappings = env::var("TRANSCODER_PRESET_MAPPINGS")
            .map(|raw| parse_preset_mappings(&raw))
            .unwrap_or_default();

        let customers_without_storage_check = env::var("CUSTOMERS_WITHOUT_STORAGE_CHECK")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse::<i32>().ok())
            .collect();

        Ok(EngineConfig {
            environment,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            database_url,
            db_max_connections,
            db_timeout_seconds,
            storage_backend,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            s3_endpoint: optional_var("S3_ENDPOINT"),
            local_storage_path: optional_var("LOCAL_STORAGE_PATH"),
            thumbs_bucket: env::var("THUMBS_BUCKET")
                .unwrap_or_else(|_| format!("{}-thumbs", storage_bucket)),
            timebased_input_bucket: env::var("TIMEBASED_INPUT_BUCKET")
                .unwrap_or_else(|_| format!("{}-timebased-in", storage_bucket)),
            timebased_output_bucket: env::var("TIMEBASED_OUTPUT_BUCKET")
                .unwrap_or_else(|_| format!("{}-timebased-out", storage_bucket)),
            storage_bucket,
            scratch_root: env::var("SCRATCH_ROOT").unwrap_or_else(|_| DEFAULT_SCRATCH_ROOT.to_string()),
            image_processor_url: env::var("IMAGE_PROCESSOR_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_PROCESSOR_URL.to_string()),
            queues: QueueNames {
                image: optional_var("IMAGE_QUEUE"),
                priority_image: optional_var("PRIORITY_IMAGE_QUEUE"),
                timebased: optional_var("TIMEBASED_QUEUE"),
                file: optional_var("FILE_QUEUE"),
                transcode_complete: optional_var("TRANSCODE_COMPLETE_QUEUE"),
                notification: optional_var("NOTIFICATION_QUEUE"),
            },
            queue_wait_time_secs,
            queue_max_messages,
            transcoder_pipeline_name: env::var("TRANSCODER_PIPELINE_NAME")
                .unwrap_or_else(|_| "portico-pipeline".to_string()),
            transcoder_preset_mappings,
            customers_without_storage_check,
            origin_strategy_cache_ttl_secs: env::var("ORIGIN_STRATEGY_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ORIGIN_STRATEGY_CACHE_TTL_SECS),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database_url.trim().is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL cannot be empty"));
        }
        if self.storage_bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("STORAGE_BUCKET cannot be empty"));
        }
        if self.storage_backend == StorageBackend::Local && self.local_storage_path.is_none() {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
            ));
        }
        if !(1..=10).contains(&self.queue_max_messages) {
            return Err(anyhow::anyhow!(
                "QUEUE_MAX_MESSAGES must be between 1 and 10, got {}",
                self.queue_max_messages
            ));
        }
        if !(0..=20).contains(&self.queue_wait_time_secs) {
            return Err(anyhow::anyhow!(
                "QUEUE_WAIT_TIME_SECS must be between 0 and 20, got {}",
                self.queue_wait_time_secs
            ));
        }
        Ok(())
    }
}
