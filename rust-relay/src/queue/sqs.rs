//! SQS implementation of [`QueueClient`].
//!
//! A thin wrapper around `aws_sdk_sqs::Client`. The SDK client is cheap to
//! clone and safe to share, so one [`SqsQueue`] serves every pipeline.

use std::error::Error as StdError;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use tracing::{debug, info, warn};

use super::{QueueClient, QueuedMessage};
use crate::config::RelayConfig;
use crate::error::QueueTransportError;

/// SQS-backed queue collaborator.
#[derive(Clone, Debug)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout: Duration,
}

impl SqsQueue {
    /// Wrap an existing SDK client.
    pub fn new(client: Client, queue_url: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            visibility_timeout,
        }
    }

    /// Build a client from the shared AWS configuration chain.
    ///
    /// Region and endpoint overrides from `config` take precedence over the
    /// environment and profile files.
    pub async fn connect(config: &RelayConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(endpoint) = &config.queue_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        info!(
            queue_url = %config.queue_url,
            region = ?shared.region().map(|r| r.as_ref().to_string()),
            custom_endpoint = config.queue_endpoint_url.is_some(),
            "sqs_client_created"
        );

        Self::new(client, config.queue_url.clone(), config.visibility_timeout)
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive_messages(
        &self,
        max_batch: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueTransportError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_batch.clamp(1, 10) as i32)
            .wait_time_seconds(wait_time.as_secs().min(20) as i32)
            .visibility_timeout(self.visibility_timeout.as_secs() as i32)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueTransportError::new("receive", describe_sdk_error(&e)))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_queued_message)
            .collect();

        Ok(messages)
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueTransportError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueTransportError::new("delete", describe_sdk_error(&e)))?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueTransportError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueTransportError::new("extend_visibility", describe_sdk_error(&e)))?;
        Ok(())
    }
}

/// Convert an SDK message, dropping deliveries that cannot be acknowledged.
pub(crate) fn to_queued_message(message: Message) -> Option<QueuedMessage> {
    let id = message.message_id().unwrap_or("unknown").to_string();

    let Some(receipt_handle) = message.receipt_handle() else {
        warn!(message_id = %id, "sqs_message_missing_receipt_handle");
        return None;
    };

    let attributes = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .string_value()
                        .map(|s| (name.clone(), s.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let approx_receive_count = message
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse::<u32>().ok())
        .unwrap_or(1);

    debug!(
        message_id = %id,
        receive_count = approx_receive_count,
        "sqs_message_converted"
    );

    Some(QueuedMessage {
        id,
        receipt_handle: receipt_handle.to_string(),
        body: message.body().unwrap_or_default().to_string(),
        attributes,
        approx_receive_count,
    })
}

fn describe_sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug,
{
    match err {
        SdkError::ServiceError(ctx) => format!(
            "service error {}: {}",
            ctx.err().code().unwrap_or("unknown"),
            ctx.err().message().unwrap_or("n/a")
        ),
        SdkError::DispatchFailure(_) => format!("dispatch failure: {err}"),
        SdkError::TimeoutError(_) => format!("timeout: {err}"),
        SdkError::ResponseError(_) => format!("response error: {err}"),
        _ => err.to_string(),
    }
}
