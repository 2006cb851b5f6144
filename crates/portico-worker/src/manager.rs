//! Owner of every queue listener and the cancellation signal they share.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerResolver, MessageType};
use crate::listener::{ListenerSettings, QueueListener};
use crate::lookup::QueueLookup;

pub struct ListenerManager {
    lookup: QueueLookup,
    resolver: Arc<HandlerResolver>,
    settings: ListenerSettings,
    cancel: CancellationToken,
    listeners: Mutex<Vec<Arc<QueueListener>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ListenerManager {
    pub fn new(lookup: QueueLookup, resolver: HandlerResolver, settings: ListenerSettings) -> Self {
        Self {
            lookup,
            resolver: Arc::new(resolver),
            settings,
            cancel: CancellationToken::new(),
            listeners: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for `queue_name`. It does not poll until [`Self::start_listening`].
    pub fn add_listener(&self, queue_name: impl Into<String>, message_type: MessageType) -> Arc<QueueListener> {
        let listener = Arc::new(QueueListener::new(
            queue_name,
            message_type,
            self.lookup.clone(),
            self.resolver.clone(),
            self.settings,
        ));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener.clone());
        }
        tracing::info!(queue = %listener.queue_name(), message_type = %message_type, "Listener registered");
        listener
    }

    /// Start every registered listener that is not already running.
    pub fn start_listening(&self) {
        if self.cancel.is_cancelled() {
            tracing::warn!("Listener manager already stopped, not starting listeners");
            return;
        }

        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };

        let started: Vec<JoinHandle<()>> = listeners
            .iter()
            .filter_map(|listener| listener.start(self.cancel.child_token()))
            .collect();

        tracing::info!(started = started.len(), registered = listeners.len(), "Queue listeners started");
        if let Ok(mut handles) = self.handles.lock() {
            handles.extend(started);
        }
    }

    /// Signal every listener to stop after its current message.
    pub fn stop_listening(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Stopping queue listeners");
            self.cancel.cancel();
        }
    }

    /// Wait for every started loop to exit. Call after [`Self::stop_listening`].
    pub async fn wait_for_shutdown(&self) {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue listener task panicked");
            }
        }
    }

    pub fn listeners(&self) -> Vec<Arc<QueueListener>> {
        self.listeners
            .lock()
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }

    pub fn is_listening(&self) -> bool {
        self.listeners().iter().any(|l| l.is_listening())
    }
}
