//! Queue message envelope and client trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::QueueError;

/// A message received from a queue, as handed to a [`crate::MessageHandler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier from the queue provider.
    pub id: String,
    /// Message body, parsed as JSON. A body that is not JSON is carried as a string value.
    pub body: serde_json::Value,
    pub attributes: HashMap<String, String>,
    pub queue_name: String,
    /// Provider-specific handle used to delete the message once handled.
    pub receipt_handle: String,
}

impl QueueMessage {
    pub fn parse_body(raw: &str) -> serde_json::Value {
        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    }
}

/// Outcome of a batch send: ids of entries the provider accepted and rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchResult {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
}

/// An entry of a batch send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub id: String,
    pub body: String,
}

/// Trait for queue backends.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Resolve a queue name to its URL. `Ok(None)` if the queue does not exist.
    async fn get_queue_url(&self, queue_name: &str) -> Result<Option<String>, QueueError>;

    /// Long-poll for up to `max_messages`, waiting at most `wait_time_secs`.
    /// Returns an empty vec if no messages are available.
    async fn receive(
        &self,
        queue_name: &str,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a handled message from the queue.
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;

    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutgoingMessage],
    ) -> Result<SendBatchResult, QueueError>;
}
