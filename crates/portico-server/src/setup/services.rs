//! Engine component wiring

use anyhow::{Context, Result};
use portico_core::{AssetFamily, Config};
use portico_db::{
    EngineAssetRepository, OriginStrategyRepository, StorageRepository, TranscodeJobRepository,
};
use portico_engine::completion::{TimebasedBuckets, TimebasedCompletion};
use portico_engine::ingest::{
    AssetIngester, FileChannelWorker, ImageBuckets, ImageIngesterWorker, ImageProcessorClient,
    StorageCheckExemptions, TimebasedIngesterWorker,
};
use portico_engine::mover::{AssetToBucket, AssetToDisk, StorageQuota};
use portico_engine::origin::{
    BasicHttpAuthOriginStrategy, BucketCredentialsProvider, DefaultOriginStrategy, OriginFetcher,
    OriginStrategy, OriginStrategyResolver, S3AmbientOriginStrategy, SftpOriginStrategy,
};
use portico_engine::transcode::{ElasticTranscoderBackend, Transcoder, TranscoderLookup, TranscoderSettings};
use portico_engine::AssetNotificationSender;
use portico_storage::BucketStore;
use portico_worker::QueueLookup;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Origin fetches give up on a connection that takes longer than this.
const ORIGIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Components the queue handlers are built from.
pub struct EngineServices {
    pub ingester: Arc<AssetIngester>,
    pub completion: Arc<TimebasedCompletion>,
}

pub async fn initialize_services(
    config: &Config,
    pool: PgPool,
    store: Arc<dyn BucketStore>,
    lookup: QueueLookup,
) -> Result<EngineServices> {
    let assets = Arc::new(EngineAssetRepository::new(pool.clone()));
    let strategies = Arc::new(OriginStrategyRepository::new(pool.clone()));
    let metrics = Arc::new(StorageRepository::new(pool.clone()));
    let jobs = Arc::new(TranscodeJobRepository::new(pool));

    let http = reqwest::Client::builder()
        .connect_timeout(ORIGIN_CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let credentials = Arc::new(BucketCredentialsProvider::new(store.clone()));
    let origin_strategies: Vec<Arc<dyn OriginStrategy>> = vec![
        Arc::new(DefaultOriginStrategy::new(http.clone())),
        Arc::new(BasicHttpAuthOriginStrategy::new(http.clone(), credentials)),
        Arc::new(S3AmbientOriginStrategy::new(store.clone())),
        Arc::new(SftpOriginStrategy),
    ];
    let fetcher = Arc::new(OriginFetcher::new(origin_strategies));

    let quota = StorageQuota::new(metrics);
    let exemptions = StorageCheckExemptions::new(config.customers_without_storage_check().to_vec());
    let disk = AssetToDisk::new(fetcher, quota.clone());
    let bucket_mover = AssetToBucket::new(disk.clone(), store.clone(), quota, config.scratch_root());

    let image_worker = ImageIngesterWorker::new(
        disk,
        ImageProcessorClient::new(http, config.image_processor_url()),
        store.clone(),
        ImageBuckets {
            storage: config.storage_bucket().to_string(),
            thumbs: config.thumbs_bucket().to_string(),
        },
        config.scratch_root(),
        exemptions.clone(),
    );

    let backend = Arc::new(ElasticTranscoderBackend::new(config.aws_region().to_string(), None).await);
    let transcoder_lookup = Arc::new(TranscoderLookup::new(backend));
    let transcoder = Transcoder::new(
        transcoder_lookup.clone(),
        jobs,
        TranscoderSettings {
            pipeline_name: config.transcoder_pipeline_name().to_string(),
            preset_mappings: config.transcoder_preset_mappings().clone(),
        },
    );
    let timebased_worker = TimebasedIngesterWorker::new(
        bucket_mover.clone(),
        Arc::new(transcoder),
        config.timebased_input_bucket(),
        exemptions.clone(),
    );
    let file_worker = FileChannelWorker::new(bucket_mover, config.storage_bucket(), exemptions);

    let notifications = AssetNotificationSender::new(lookup, config.queues().notification.clone());
    let resolver = Arc::new(
        OriginStrategyResolver::new(strategies, config.storage_bucket())
            .with_ttl(Duration::from_secs(config.origin_strategy_cache_ttl_secs())),
    );
    let ingester = AssetIngester::new(resolver, assets.clone())
        .with_worker(AssetFamily::Image, Arc::new(image_worker))
        .with_worker(AssetFamily::Timebased, Arc::new(timebased_worker))
        .with_file_worker(Arc::new(file_worker))
        .with_notifications(notifications.clone());

    let completion = TimebasedCompletion::new(
        assets,
        store,
        transcoder_lookup,
        TimebasedBuckets {
            input: config.timebased_input_bucket().to_string(),
            output: config.timebased_output_bucket().to_string(),
            storage: config.storage_bucket().to_string(),
        },
        Some(notifications),
    );

    tracing::info!(
        pipeline = config.transcoder_pipeline_name(),
        preset_mappings = config.transcoder_preset_mappings().len(),
        exempt_customers = config.customers_without_storage_check().len(),
        "Engine services initialized"
    );

    Ok(EngineServices {
        ingester: Arc::new(ingester),
        completion: Arc::new(completion),
    })
}
