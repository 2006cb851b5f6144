//! Long-poll loop for a single queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerResolver, MessageType};
use crate::lookup::QueueLookup;
use crate::message::QueueMessage;

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    pub max_messages: i32,
    pub wait_time_secs: i32,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time_secs: 20,
        }
    }
}

/// Polls one queue and dispatches each message to the handler for its type.
///
/// Messages from one queue are handled strictly in order. A message is deleted
/// only after its handler reports success.
pub struct QueueListener {
    queue_name: String,
    message_type: MessageType,
    lookup: QueueLookup,
    resolver: Arc<HandlerResolver>,
    settings: ListenerSettings,
    listening: Arc<AtomicBool>,
}

impl QueueListener {
    pub fn new(
        queue_name: impl Into<String>,
        message_type: MessageType,
        lookup: QueueLookup,
        resolver: Arc<HandlerResolver>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_type,
            lookup,
            resolver,
            settings,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Spawn the poll loop. Returns `None`, and does nothing, if already listening.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(queue = %self.queue_name, "Listener already running, not starting again");
            return None;
        }

        let listener = Arc::clone(self);
        Some(tokio::spawn(async move {
            listener.run(cancel).await;
        }))
    }

    async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            queue = %self.queue_name,
            message_type = %self.message_type,
            "Queue listener started"
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.poll_once(&cancel).await {
                tracing::error!(error = %e, queue = %self.queue_name, "Error polling queue");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                }
            }
        }

        self.listening.store(false, Ordering::SeqCst);
        tracing::info!(queue = %self.queue_name, "Queue listener stopped");
    }

    /// One receive plus sequential handling of whatever arrived.
    async fn poll_once(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let queue_url = self.lookup.get_queue_url(&self.queue_name).await?;
        let messages = self
            .lookup
            .client()
            .receive(
                &self.queue_name,
                &queue_url,
                self.settings.max_messages,
                self.settings.wait_time_secs,
            )
            .await?;

        for message in messages {
            if cancel.is_cancelled() {
                tracing::debug!(queue = %self.queue_name, "Cancelled, leaving remaining messages for redelivery");
                break;
            }
            self.handle_message(&queue_url, &message, cancel).await;
        }
        Ok(())
    }

    async fn handle_message(
        &self,
        queue_url: &str,
        message: &QueueMessage,
        cancel: &CancellationToken,
    ) {
        let Some(handler) = self.resolver.resolve(self.message_type) else {
            tracing::error!(
                queue = %self.queue_name,
                message_type = %self.message_type,
                message_id = %message.id,
                "No handler registered for message type"
            );
            return;
        };

        let start = std::time::Instant::now();
        match handler.handle(message, cancel).await {
            Ok(true) => {
                if let Err(e) = self
                    .lookup
                    .client()
                    .delete(queue_url, &message.receipt_handle)
                    .await
                {
                    tracing::error!(
                        error = %e,
                        queue = %self.queue_name,
                        message_id = %message.id,
                        "Failed to delete handled message"
                    );
                }
                tracing::debug!(
                    queue = %self.queue_name,
                    message_id = %message.id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Message handled"
                );
            }
            Ok(false) => {
                tracing::warn!(
                    queue = %self.queue_name,
                    message_id = %message.id,
                    "Handler did not complete message, leaving for redelivery"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    queue = %self.queue_name,
                    message_id = %message.id,
                    "Handler failed"
                );
            }
        }
    }
}
