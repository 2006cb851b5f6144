//! AWS SQS queue client.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::get_queue_url::GetQueueUrlError;
use aws_sdk_sqs::types::{MessageSystemAttributeName, SendMessageBatchRequestEntry};
use aws_sdk_sqs::Client;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::QueueError;
use crate::message::{OutgoingMessage, QueueClient, QueueMessage, SendBatchResult};

/// SQS caps receive and batch send at 10 messages per request.
const SQS_MAX_BATCH: usize = 10;

/// SQS-backed queue client.
#[derive(Clone)]
pub struct SqsQueueClient {
    client: Client,
}

impl SqsQueueClient {
    /// Build a client for `region`, optionally pointed at a custom endpoint
    /// (e.g. "http://localhost:4566" for LocalStack).
    pub async fn new(region: String, endpoint_url: Option<String>) -> Result<Self, QueueError> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new(region.clone()))
            .load()
            .await;

        let mut sqs_config = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url.filter(|e| !e.is_empty()) {
            sqs_config = sqs_config.endpoint_url(endpoint);
        }

        info!(region = %region, "SQS queue client initialized");
        Ok(Self {
            client: Client::from_conf(sqs_config.build()),
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<Option<String>, QueueError> {
        match self.client.get_queue_url().queue_name(queue_name).send().await {
            Ok(resp) => Ok(resp.queue_url().map(String::from)),
            Err(SdkError::ServiceError(err))
                if matches!(err.err(), GetQueueUrlError::QueueDoesNotExist(_)) =>
            {
                Ok(None)
            }
            Err(e) => Err(QueueError::Connection(format!(
                "SQS get queue url failed: {e:?}"
            ))),
        }
    }

    async fn receive(
        &self,
        queue_name: &str,
        queue_url: &str,
        max_messages: i32,
        wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let capped = max_messages.clamp(1, SQS_MAX_BATCH as i32);
        debug!(queue = queue_name, max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(wait_time_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let receipt_handle = msg
                .receipt_handle()
                .ok_or_else(|| QueueError::Parse("missing receipt handle".into()))?
                .to_string();

            let attributes: HashMap<String, String> = msg
                .attributes()
                .map(|attrs| {
                    attrs
                        .iter()
                        .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();

            messages.push(QueueMessage {
                id: msg.message_id().unwrap_or("unknown").to_string(),
                body: QueueMessage::parse_body(msg.body().unwrap_or("")),
                attributes,
                queue_name: queue_name.to_string(),
                receipt_handle,
            });
        }

        debug!(queue = queue_name, count = messages.len(), "Received SQS messages");
        Ok(messages)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(format!("SQS delete failed: {e:?}")))?;
        Ok(())
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        messages: &[OutgoingMessage],
    ) -> Result<SendBatchResult, QueueError> {
        let mut result = SendBatchResult::default();

        for chunk in messages.chunks(SQS_MAX_BATCH) {
            let entries = chunk
                .iter()
                .map(|m| {
                    SendMessageBatchRequestEntry::builder()
                        .id(&m.id)
                        .message_body(&m.body)
                        .build()
                        .map_err(|e| QueueError::Send(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let resp = self
                .client
                .send_message_batch()
                .queue_url(queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| QueueError::Send(format!("SQS send batch failed: {e:?}")))?;

            result
                .successful
                .extend(resp.successful().iter().map(|s| s.id().to_string()));
            result
                .failed
                .extend(resp.failed().iter().map(|f| f.id().to_string()));
        }

        Ok(result)
    }
}
