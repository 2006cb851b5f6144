//! Enqueueing ingest requests while keeping the per-customer queue counters in step.

use portico_db::QueueCounterStore;
use portico_worker::{OutgoingMessage, QueueLookup};
use std::sync::Arc;

use crate::ingest::IngestAssetRequest;

/// Maximum entries per batch send.
const MAX_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub struct IngestRequestSender {
    lookup: QueueLookup,
    counters: Arc<dyn QueueCounterStore>,
}

impl IngestRequestSender {
    pub fn new(lookup: QueueLookup, counters: Arc<dyn QueueCounterStore>) -> Self {
        Self { lookup, counters }
    }

    /// Send `requests` to `queue_name` and return how many were accepted.
    ///
    /// The customer's counter for the queue is raised by the full amount before
    /// sending and lowered again for every message that was not sent.
    #[tracing::instrument(skip(self, requests), fields(queue = queue_name, count = requests.len()))]
    pub async fn send(&self, customer: i32, queue_name: &str, requests: &[IngestAssetRequest]) -> usize {
        if requests.is_empty() {
            return 0;
        }
        let total = i32::try_from(requests.len()).unwrap_or(i32::MAX);
        if let Err(e) = self.counters.increment_size(customer, queue_name, total).await {
            tracing::error!(error = %e, customer, queue = queue_name, "Failed to increment queue counter");
        }

        let sent = self.send_all(customer, queue_name, requests).await;

        let failed = requests.len() - sent;
        if failed > 0 {
            let failed = i32::try_from(failed).unwrap_or(i32::MAX);
            if let Err(e) = self.counters.decrement_size(customer, queue_name, failed).await {
                tracing::error!(error = %e, customer, queue = queue_name, "Failed to decrement queue counter");
            }
        }

        tracing::info!(customer, queue = queue_name, sent, failed, "Sent ingest requests");
        sent
    }

    /// Send in batches and return how many messages the queue accepted. A failed
    /// batch counts as unsent and later batches are still attempted.
    async fn send_all(&self, customer: i32, queue_name: &str, requests: &[IngestAssetRequest]) -> usize {
        let url = match self.lookup.get_queue_url(queue_name).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, customer, queue = queue_name, "Failed to find queue for ingest requests");
                return 0;
            }
        };

        let mut sent = 0;
        for chunk in requests.chunks(MAX_BATCH_SIZE) {
            let mut messages = Vec::with_capacity(chunk.len());
            for (index, request) in chunk.iter().enumerate() {
                match serde_json::to_string(request) {
                    Ok(body) => messages.push(OutgoingMessage {
                        id: index.to_string(),
                        body,
                    }),
                    Err(e) => {
                        tracing::error!(error = %e, asset_id = %request.asset.id, "Failed to serialize ingest request");
                    }
                }
            }
            if messages.is_empty() {
                continue;
            }

            match self.lookup.client().send_batch(&url, &messages).await {
                Ok(result) => {
                    for id in &result.failed {
                        tracing::warn!(queue = queue_name, entry = %id, "Ingest request rejected by queue");
                    }
                    sent += result.successful.len();
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        customer,
                        queue = queue_name,
                        batch_size = messages.len(),
                        "Failed to send batch of ingest requests"
                    );
                }
            }
        }
        sent
    }
}
