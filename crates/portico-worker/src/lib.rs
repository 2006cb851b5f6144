//! Portico Worker
//!
//! Queue listener infrastructure: long-poll loops over managed queues that
//! dispatch each message to a handler resolved by message type.

pub mod error;
pub mod handler;
pub mod listener;
pub mod lookup;
pub mod manager;
pub mod message;
#[cfg(feature = "sqs")]
pub mod sqs;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::QueueError;
pub use handler::{HandlerResolver, MessageHandler, MessageType};
pub use listener::{ListenerSettings, QueueListener};
pub use lookup::QueueLookup;
pub use manager::ListenerManager;
pub use message::{OutgoingMessage, QueueClient, QueueMessage, SendBatchResult};
#[cfg(feature = "sqs")]
pub use sqs::SqsQueueClient;
