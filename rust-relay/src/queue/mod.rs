//! Queue module for SQS operations.
//!
//! This module provides:
//! - [`QueuedMessage`], the relay's view of one delivery
//! - [`QueueClient`], the narrow seam every pipeline talks to
//! - [`SqsQueue`], the production implementation on top of `aws-sdk-sqs`
//!
//! ## Architecture
//!
//! ```text
//! API gateway → SQS queue → QueueClient::receive_messages → pipelines
//!                          ← delete_message / extend_visibility
//! ```

pub mod sqs;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueTransportError;

pub use sqs::SqsQueue;
pub use types::QueuedMessage;

/// Operations the relay needs from the external queue.
///
/// Implementations are shared across all pipelines and must be safe for
/// concurrent use. Every error is transient from the caller's point of view.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max_batch` messages, waiting at most `wait_time`.
    async fn receive_messages(
        &self,
        max_batch: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueTransportError>;

    /// Delete one delivery.
    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueTransportError>;

    /// Hide one delivery from other consumers for `timeout`, measured from now.
    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueTransportError>;
}
