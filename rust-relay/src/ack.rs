//! Acknowledger: reconciles queue state with a delivery's final outcome.
//!
//! Only confirmed deliveries are deleted. Everything else stays on the queue,
//! where its visibility timeout and redrive policy decide what happens next.
//! Deliveries cut short by shutdown are made visible again right away.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{DecodeError, ForwardExhaustedError};
use crate::queue::{QueueClient, QueuedMessage};

/// Final state of one pipeline, as seen by the acknowledger.
#[derive(Debug)]
pub enum Disposition {
    Delivered,
    DecodeFailed(DecodeError),
    Exhausted(ForwardExhaustedError),
    /// Shutdown interrupted the retry sequence.
    Interrupted,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Delivered => "delivered",
            Disposition::DecodeFailed(_) => "decode_failed",
            Disposition::Exhausted(_) => "exhausted",
            Disposition::Interrupted => "interrupted",
        }
    }
}

/// What the acknowledger did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    Deleted,
    /// Delivered but the delete call failed; the message will come back.
    DeleteFailed,
    /// Left on the queue on purpose.
    Retained,
    /// Left on the queue and made visible to other consumers immediately.
    Released,
}

#[derive(Clone)]
pub struct Acknowledger {
    queue: Arc<dyn QueueClient>,
    poison_receive_count: u32,
}

impl Acknowledger {
    pub fn new(queue: Arc<dyn QueueClient>, poison_receive_count: u32) -> Self {
        Self {
            queue,
            poison_receive_count,
        }
    }

    pub async fn settle(&self, message: &QueuedMessage, disposition: &Disposition) -> AckAction {
        match disposition {
            Disposition::Delivered => match self.queue.delete_message(&message.receipt_handle).await {
                Ok(()) => {
                    info!(message_id = %message.id, "relay_message_deleted");
                    AckAction::Deleted
                }
                Err(e) => {
                    error!(
                        message_id = %message.id,
                        error = %e,
                        "relay_message_delete_failed"
                    );
                    AckAction::DeleteFailed
                }
            },
            Disposition::DecodeFailed(e) => {
                error!(
                    message_id = %message.id,
                    receive_count = message.approx_receive_count,
                    error = %e,
                    "relay_message_undecodable"
                );
                self.report_poison(message);
                AckAction::Retained
            }
            Disposition::Exhausted(e) => {
                warn!(
                    message_id = %message.id,
                    receive_count = message.approx_receive_count,
                    attempts = e.attempts,
                    last_status = ?e.last.status,
                    error = %e,
                    "relay_message_left_for_redelivery"
                );
                self.report_poison(message);
                AckAction::Retained
            }
            Disposition::Interrupted => match self
                .queue
                .extend_visibility(&message.receipt_handle, Duration::ZERO)
                .await
            {
                Ok(()) => {
                    info!(message_id = %message.id, "relay_message_released_on_shutdown");
                    AckAction::Released
                }
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "relay_message_retained_on_shutdown"
                    );
                    AckAction::Retained
                }
            },
        }
    }

    /// True once `message` has been received at least `poison_receive_count` times.
    pub fn is_probable_poison(&self, message: &QueuedMessage) -> bool {
        self.poison_receive_count > 0 && message.approx_receive_count >= self.poison_receive_count
    }

    fn report_poison(&self, message: &QueuedMessage) {
        if self.is_probable_poison(message) {
            warn!(
                message_id = %message.id,
                receive_count = message.approx_receive_count,
                threshold = self.poison_receive_count,
                "relay_message_probably_poison"
            );
        }
    }
}
