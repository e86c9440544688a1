//! Visibility extension for deliveries that are still being retried.
//!
//! SQS starts a delivery's visibility window when it is received. If retries
//! outlast that window the queue hands the message to another consumer while
//! this one is still working on it. The extender tracks the window and pushes
//! it forward when the next step would run past it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, MAX_VISIBILITY_TIMEOUT_SECS};
use crate::error::VisibilityExtendError;
use crate::forward::RetryHook;
use crate::queue::{QueueClient, QueuedMessage};

/// Per-delivery visibility tracker.
pub struct VisibilityExtender {
    queue: Arc<dyn QueueClient>,
    message_id: String,
    receipt_handle: String,
    visibility_timeout: Duration,
    safety_margin: Duration,
    attempt_timeout: Duration,
    received_at: Instant,
    deadline: Instant,
    extensions: u32,
    gave_up: bool,
}

impl VisibilityExtender {
    /// Track `message`, received at `received_at` with the configured visibility timeout.
    pub fn new(
        queue: Arc<dyn QueueClient>,
        message: &QueuedMessage,
        received_at: Instant,
        config: &RelayConfig,
    ) -> Self {
        Self {
            queue,
            message_id: message.id.clone(),
            receipt_handle: message.receipt_handle.clone(),
            visibility_timeout: config.visibility_timeout,
            safety_margin: config.visibility_safety_margin,
            attempt_timeout: config.request_timeout,
            received_at,
            deadline: received_at + config.visibility_timeout,
            extensions: 0,
            gave_up: false,
        }
    }

    /// Time left before the queue may redeliver the message.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Number of successful extensions so far.
    pub fn extensions(&self) -> u32 {
        self.extensions
    }

    /// Extend the window if `upcoming` work plus the safety margin would not fit.
    ///
    /// Returns `Ok(true)` when an extension was issued. After a failed
    /// extension the tracker stops trying: the receipt handle is most likely
    /// no longer valid and the message will be redelivered anyway.
    pub async fn ensure_covers(&mut self, upcoming: Duration) -> Result<bool, VisibilityExtendError> {
        if self.gave_up {
            return Ok(false);
        }

        let needed = upcoming.saturating_add(self.safety_margin);
        if self.remaining() > needed {
            return Ok(false);
        }

        let max = Duration::from_secs(MAX_VISIBILITY_TIMEOUT_SECS);
        let timeout = self.visibility_timeout.max(needed).min(max);
        let timeout = Duration::from_secs(timeout.as_secs().max(1));
        let elapsed = self.received_at.elapsed();

        match self
            .queue
            .extend_visibility(&self.receipt_handle, timeout)
            .await
        {
            Ok(()) => {
                self.deadline = Instant::now() + timeout;
                self.extensions += 1;
                info!(
                    message_id = %self.message_id,
                    timeout_secs = timeout.as_secs(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    extensions = self.extensions,
                    "relay_visibility_extended"
                );
                Ok(true)
            }
            Err(source) => {
                self.gave_up = true;
                Err(VisibilityExtendError {
                    timeout,
                    elapsed,
                    source,
                })
            }
        }
    }

    async fn extend_logged(&mut self, upcoming: Duration) {
        if let Err(e) = self.ensure_covers(upcoming).await {
            warn!(
                message_id = %self.message_id,
                error = %e,
                "relay_visibility_extend_failed"
            );
        }
    }
}

#[async_trait]
impl RetryHook for VisibilityExtender {
    async fn before_attempt(&mut self, attempt: u32) {
        debug!(
            message_id = %self.message_id,
            attempt = attempt,
            remaining_ms = self.remaining().as_millis() as u64,
            "relay_visibility_check"
        );
        self.extend_logged(self.attempt_timeout).await;
    }

    async fn before_wait(&mut self, _attempt: u32, wait: Duration) {
        self.extend_logged(wait.saturating_add(self.attempt_timeout))
            .await;
    }
}
