//! In-memory queue client used by tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::QueueError;
use crate::message::{OutgoingMessage, QueueClient, QueueMessage, SendBatchResult};

#[derive(Default)]
pub struct FakeQueueClient {
    queues: Mutex<HashMap<String, VecDeque<QueueMessage>>>,
    deleted: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
    url_lookups: AtomicUsize,
    received: AtomicUsize,
    fail_sends: AtomicBool,
    fail_sends_after: Mutex<Option<usize>>,
    send_calls: AtomicUsize,
    rejected_ids: Mutex<Vec<String>>,
}

impl FakeQueueClient {
    pub fn with_queue(name: &str) -> Self {
        let client = Self::default();
        client.add_queue(name);
        client
    }

    pub fn add_queue(&self, name: &str) {
        self.queues
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
    }

    pub fn push(&self, queue: &str, id: &str, body: serde_json::Value) {
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(QueueMessage {
                id: id.to_string(),
                body,
                attributes: HashMap::new(),
                queue_name: queue.to_string(),
                receipt_handle: format!("receipt-{id}"),
            });
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Accept the first `batches` batch sends, then fail every later one.
    pub fn fail_sends_after(&self, batches: usize) {
        *self.fail_sends_after.lock().unwrap() = Some(batches);
    }

    pub fn reject(&self, id: &str) {
        self.rejected_ids.lock().unwrap().push(id.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn url_lookups(&self) -> usize {
        self.url_lookups.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    fn url_for(name: &str) -> String {
        format!("https://queue.local/{name}")
    }
}

#[async_trait]
impl QueueClient for FakeQueueClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<Option<String>, QueueError> {
        self.url_lookups.fetch_add(1, Ordering::SeqCst);
        let exists = self.queues.lock().unwrap().contains_key(queue_name);
        Ok(exists.then(|| Self::url_for(queue_name)))
    }

    async fn receive(
        &self,
        queue_name: &str,
        _queue_url: &str,
        max_messages: i32,
        _wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let batch: Vec<QueueMessage> = {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(queue_name.to_string()).or_default();
            let take = queue.len().min(max_messages.max(0) as usize);
            queue.drain(..take).collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.received.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(batch)
    }

    async fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutgoingMessage],
    ) -> Result<SendBatchResult, QueueError> {
        let call = self.send_calls.fetch_add(1, Ordering::SeqCst);
        let past_limit = self
            .fail_sends_after
            .lock()
            .unwrap()
            .is_some_and(|limit| call >= limit);
        if self.fail_sends.load(Ordering::SeqCst) || past_limit {
            return Err(QueueError::Send("queue unavailable".to_string()));
        }
        let rejected = self.rejected_ids.lock().unwrap().clone();
        let mut result = SendBatchResult::default();
        for message in messages {
            if rejected.contains(&message.id) {
                result.failed.push(message.id.clone());
            } else {
                self.sent
                    .lock()
                    .unwrap()
                    .push((queue_url.to_string(), message.clone()));
                result.successful.push(message.id.clone());
            }
        }
        Ok(result)
    }
}
