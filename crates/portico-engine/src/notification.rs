//! Asset-modified events for subsystems that cache or index assets.

use portico_core::models::Asset;
use portico_worker::{OutgoingMessage, QueueLookup};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetModifiedNotification<'a> {
    change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<&'a Asset>,
    after: &'a Asset,
}

/// Publishes asset-modified events to the notification queue.
///
/// Without a configured queue every send is a no-op.
#[derive(Clone)]
pub struct AssetNotificationSender {
    lookup: QueueLookup,
    queue_name: Option<String>,
}

impl AssetNotificationSender {
    pub fn new(lookup: QueueLookup, queue_name: Option<String>) -> Self {
        Self { lookup, queue_name }
    }

    /// Publish an `Update` for `after`. Failures are logged.
    pub async fn send_asset_modified(&self, before: Option<&Asset>, after: &Asset) {
        let Some(queue_name) = self.queue_name.as_deref() else {
            return;
        };

        let notification = AssetModifiedNotification {
            change_type: ChangeType::Update,
            before,
            after,
        };
        let body = match serde_json::to_string(&notification) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, asset_id = %after.id, "Failed to serialize asset notification");
                return;
            }
        };

        let url = match self.lookup.get_queue_url(queue_name).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, queue = queue_name, "Unable to resolve notification queue");
                return;
            }
        };

        let message = OutgoingMessage {
            id: uuid::Uuid::new_v4().to_string(),
            body,
        };
        match self.lookup.client().send_batch(&url, std::slice::from_ref(&message)).await {
            Ok(result) if result.failed.is_empty() => {
                tracing::debug!(asset_id = %after.id, queue = queue_name, "Sent asset modified notification");
            }
            Ok(_) => {
                tracing::warn!(asset_id = %after.id, queue = queue_name, "Asset modified notification rejected");
            }
            Err(e) => {
                tracing::error!(error = %e, asset_id = %after.id, queue = queue_name, "Failed to send asset modified notification");
            }
        }
    }
}
