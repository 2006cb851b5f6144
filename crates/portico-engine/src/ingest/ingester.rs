use portico_core::models::{channels, Asset, AssetFamily, CustomerOriginStrategy};
use portico_db::AssetStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{AssetIngesterWorker, IngestAssetRequest, IngestResult, STORAGE_LIMIT_EXCEEDED_ERROR};
use crate::context::IngestionContext;
use crate::notification::AssetNotificationSender;
use crate::origin::OriginStrategyResolver;

/// Runs the workers for one asset and records the outcome.
///
/// The file worker runs first for assets on the `file` channel, then the
/// worker registered for the asset's family. Anything but a queued result is
/// written back with `update_ingested_asset` so the asset never stays ingesting.
pub struct AssetIngester {
    resolver: Arc<OriginStrategyResolver>,
    assets: Arc<dyn AssetStore>,
    workers: HashMap<AssetFamily, Arc<dyn AssetIngesterWorker>>,
    file_worker: Option<Arc<dyn AssetIngesterWorker>>,
    notifications: Option<AssetNotificationSender>,
}

impl AssetIngester {
    pub fn new(resolver: Arc<OriginStrategyResolver>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            resolver,
            assets,
            workers: HashMap::new(),
            file_worker: None,
            notifications: None,
        }
    }

    pub fn with_worker(mut self, family: AssetFamily, worker: Arc<dyn AssetIngesterWorker>) -> Self {
        self.workers.insert(family, worker);
        self
    }

    /// Worker for the `file` channel. Also handles the `File` family.
    pub fn with_file_worker(mut self, worker: Arc<dyn AssetIngesterWorker>) -> Self {
        self.file_worker = Some(worker);
        self
    }

    pub fn with_notifications(mut self, notifications: AssetNotificationSender) -> Self {
        self.notifications = Some(notifications);
        self
    }

    #[tracing::instrument(skip_all, fields(asset_id = %request.asset.id, family = %request.asset.family))]
    pub async fn ingest(&self, request: IngestAssetRequest, cancel: &CancellationToken) -> IngestResult {
        let before = request.asset.clone();
        let mut context = IngestionContext::new(request.asset);
        context.asset.mark_ingest_started();

        let start = std::time::Instant::now();
        let mut result = match self
            .resolver
            .get_customer_origin_strategy(&context.asset.id, &context.asset.origin)
            .await
        {
            Ok(customer_origin_strategy) => {
                self.run_workers(&mut context, &customer_origin_strategy, cancel)
                    .await
            }
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Unable to resolve origin strategy");
                context.asset.error = format!("Unable to resolve origin strategy: {}", e);
                IngestResult::Failed
            }
        };

        if result == IngestResult::StorageLimitExceeded {
            context.asset.error = STORAGE_LIMIT_EXCEEDED_ERROR.to_string();
        }

        tracing::info!(
            asset_id = %context.asset.id,
            %result,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Ingest finished"
        );

        if result != IngestResult::QueuedForProcessing && !self.complete(&before, &mut context).await {
            result = IngestResult::Failed;
        }
        result
    }

    async fn run_workers(
        &self,
        context: &mut IngestionContext,
        customer_origin_strategy: &CustomerOriginStrategy,
        cancel: &CancellationToken,
    ) -> IngestResult {
        let mut workers: Vec<&Arc<dyn AssetIngesterWorker>> = Vec::with_capacity(2);
        let wants_file = context.asset.family == AssetFamily::File
            || context.asset.has_delivery_channel(channels::FILE);
        if wants_file {
            match &self.file_worker {
                Some(worker) => workers.push(worker),
                None => return self.no_worker(context),
            }
        }
        if context.asset.family != AssetFamily::File {
            match self.workers.get(&context.asset.family) {
                Some(worker) => workers.push(worker),
                None => return self.no_worker(context),
            }
        }

        let mut result = IngestResult::Success;
        for worker in workers {
            result = worker.ingest(context, customer_origin_strategy, cancel).await;
            if result != IngestResult::Success {
                break;
            }
        }
        result
    }

    fn no_worker(&self, context: &mut IngestionContext) -> IngestResult {
        tracing::error!(asset_id = %context.asset.id, family = %context.asset.family, "No ingest worker for asset");
        context.asset.error = format!("No ingest worker for family {}", context.asset.family);
        IngestResult::Failed
    }

    /// Record the outcome. `false` if the asset could not be updated.
    async fn complete(&self, before: &Asset, context: &mut IngestionContext) -> bool {
        let updated = match self
            .assets
            .update_ingested_asset(
                &mut context.asset,
                context.image_location.as_ref(),
                context.image_storage.as_ref(),
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %context.asset.id, "Failed to record ingest outcome");
                return false;
            }
        };

        if updated {
            if let Some(notifications) = &self.notifications {
                notifications.send_asset_modified(Some(before), &context.asset).await;
            }
        }
        updated
    }
}
