use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::QueueError;
use crate::message::QueueClient;

/// Caches queue name to URL lookups.
///
/// Concurrent misses for the same name each call the provider; the last write wins.
#[derive(Clone)]
pub struct QueueLookup {
    client: Arc<dyn QueueClient>,
    urls: Arc<RwLock<HashMap<String, String>>>,
}

impl QueueLookup {
    pub fn new(client: Arc<dyn QueueClient>) -> Self {
        Self {
            client,
            urls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cached(&self, queue_name: &str) -> Option<String> {
        self.urls
            .read()
            .ok()
            .and_then(|urls| urls.get(queue_name).cloned())
    }

    pub async fn get_queue_url(&self, queue_name: &str) -> Result<String, QueueError> {
        if let Some(url) = self.cached(queue_name) {
            return Ok(url);
        }

        let url = self
            .client
            .get_queue_url(queue_name)
            .await?
            .ok_or_else(|| QueueError::NotFound(queue_name.to_string()))?;

        if let Ok(mut urls) = self.urls.write() {
            urls.insert(queue_name.to_string(), url.clone());
        }
        Ok(url)
    }

    pub fn client(&self) -> &Arc<dyn QueueClient> {
        &self.client
    }
}
