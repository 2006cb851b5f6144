//! Message handler trait and per-message handler resolution.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::message::QueueMessage;

/// The kind of message a queue carries; selects the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Ingest,
    TranscodeComplete,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Ingest => write!(f, "ingest"),
            MessageType::TranscodeComplete => write!(f, "transcode-complete"),
        }
    }
}

/// Handles one queue message.
///
/// `Ok(true)` means the message is done with and can be deleted. `Ok(false)` or
/// an `Err` leaves it on the queue for redelivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &QueueMessage, cancel: &CancellationToken) -> Result<bool>;
}

type HandlerFactory = Arc<dyn Fn() -> Arc<dyn MessageHandler> + Send + Sync>;

/// Lookup table from message type to a handler factory.
///
/// Every resolve builds a new handler, so no state leaks between messages.
#[derive(Clone, Default)]
pub struct HandlerResolver {
    factories: HashMap<MessageType, HandlerFactory>,
}

impl HandlerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, message_type: MessageType, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn MessageHandler> + Send + Sync + 'static,
    {
        self.factories.insert(message_type, Arc::new(factory));
        self
    }

    pub fn resolve(&self, message_type: MessageType) -> Option<Arc<dyn MessageHandler>> {
        self.factories.get(&message_type).map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler;

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: &QueueMessage, _cancel: &CancellationToken) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_resolve_builds_a_handler_per_call() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let resolver = HandlerResolver::new().register(MessageType::Ingest, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingHandler) as Arc<dyn MessageHandler>
        });

        assert!(resolver.resolve(MessageType::Ingest).is_some());
        assert!(resolver.resolve(MessageType::Ingest).is_some());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_unknown_type() {
        let resolver = HandlerResolver::new();
        assert!(resolver.resolve(MessageType::TranscodeComplete).is_none());
    }
}
