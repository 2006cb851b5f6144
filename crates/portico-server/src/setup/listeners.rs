//! Queue client and listener registration

use anyhow::{Context, Result};
use portico_core::Config;
use portico_engine::{IngestHandler, TranscodeCompleteHandler};
use portico_worker::{
    HandlerResolver, ListenerManager, ListenerSettings, MessageHandler, MessageType, QueueLookup,
    SqsQueueClient,
};
use std::sync::Arc;

use super::services::EngineServices;

pub async fn setup_queue_lookup(config: &Config) -> Result<QueueLookup> {
    let client = SqsQueueClient::new(config.aws_region().to_string(), None)
        .await
        .context("Failed to initialize queue client")?;
    Ok(QueueLookup::new(Arc::new(client)))
}

/// Register a listener for every configured queue.
pub fn setup_listeners(config: &Config, lookup: QueueLookup, services: EngineServices) -> ListenerManager {
    let ingester = services.ingester;
    let completion = services.completion;
    let resolver = HandlerResolver::new()
        .register(MessageType::Ingest, move || -> Arc<dyn MessageHandler> {
            Arc::new(IngestHandler::new(ingester.clone()))
        })
        .register(MessageType::TranscodeComplete, move || -> Arc<dyn MessageHandler> {
            Arc::new(TranscodeCompleteHandler::new(completion.clone()))
        });

    let settings = ListenerSettings {
        max_messages: config.queue_max_messages(),
        wait_time_secs: config.queue_wait_time_secs(),
    };
    let manager = ListenerManager::new(lookup, resolver, settings);

    let queues = config.queues();
    let ingest_queues = [&queues.image, &queues.priority_image, &queues.timebased, &queues.file];
    for name in ingest_queues.into_iter().flatten() {
        manager.add_listener(name.as_str(), MessageType::Ingest);
    }
    if let Some(name) = &queues.transcode_complete {
        manager.add_listener(name.as_str(), MessageType::TranscodeComplete);
    }

    if manager.listeners().is_empty() {
        tracing::warn!("No queues configured, the engine will not ingest anything");
    }
    manager
}
