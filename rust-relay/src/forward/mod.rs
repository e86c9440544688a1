//! Forwarding client: replays a [`ForwardRequest`] with bounded retries.
//!
//! Each attempt produces an explicit [`AttemptResult`], so the attempt
//! sequence of a delivery can be inspected after the fact through
//! [`ForwardReport`]. The client never talks to the queue; callers that need
//! to act between attempts (visibility extension) plug in a [`RetryHook`].

pub mod backoff;
pub mod http;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;
pub use crate::decode::ForwardRequest;
use crate::error::{ForwardExhaustedError, ForwardTransientError, TransientKind};

pub use backoff::Backoff;
pub use http::{HttpTarget, LocalTarget};

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOutcome {
    /// 1-based attempt number
    pub attempt: u32,
    /// Response status, absent on transport failure
    pub status: Option<u16>,
    /// True iff a 2xx response was received
    pub succeeded: bool,
}

/// What the retry loop does after one attempt.
#[derive(Debug, Clone)]
pub enum AttemptResult {
    Success(ForwardOutcome),
    Retry {
        outcome: ForwardOutcome,
        error: ForwardTransientError,
        wait: Duration,
    },
    Exhausted {
        outcome: ForwardOutcome,
        error: ForwardExhaustedError,
    },
}

/// How the attempt sequence ended.
#[derive(Debug, Clone)]
pub enum ForwardResult {
    Delivered,
    Exhausted(ForwardExhaustedError),
    /// Cancelled while waiting to retry; no further attempt was made.
    Interrupted,
}

/// Full record of one delivery's attempts.
#[derive(Debug, Clone)]
pub struct ForwardReport {
    pub outcomes: Vec<ForwardOutcome>,
    pub waits: Vec<Duration>,
    pub result: ForwardResult,
}

impl ForwardReport {
    pub fn attempts(&self) -> u32 {
        self.outcomes.len() as u32
    }

    pub fn delivered(&self) -> bool {
        matches!(self.result, ForwardResult::Delivered)
    }
}

/// Called around retry waits.
#[async_trait]
pub trait RetryHook: Send {
    /// Before attempt `attempt` is sent, including the first one.
    async fn before_attempt(&mut self, attempt: u32);

    /// Before waiting `wait` after failed attempt `attempt`.
    async fn before_wait(&mut self, attempt: u32, wait: Duration);
}

/// Hook that does nothing.
pub struct NoopRetryHook;

#[async_trait]
impl RetryHook for NoopRetryHook {
    async fn before_attempt(&mut self, _attempt: u32) {}

    async fn before_wait(&mut self, _attempt: u32, _wait: Duration) {}
}

/// Executes forward attempts against a [`LocalTarget`].
#[derive(Clone)]
pub struct ForwardingClient {
    target: Arc<dyn LocalTarget>,
    backoff: Backoff,
    max_attempts: u32,
}

impl ForwardingClient {
    pub fn new(target: Arc<dyn LocalTarget>, backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            target,
            backoff,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(target: Arc<dyn LocalTarget>, config: &RelayConfig) -> Self {
        Self::new(target, Backoff::from_config(config), config.max_attempts)
    }

    /// Send attempt number `attempt` and classify the result.
    pub async fn attempt(&self, request: &ForwardRequest, attempt: u32) -> AttemptResult {
        let started = Instant::now();
        let response = self.target.send(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let error = match response {
            Ok(status) if (200..300).contains(&status) => {
                info!(
                    message_id = %request.message_id,
                    attempt = attempt,
                    status_code = status,
                    elapsed_ms = elapsed_ms,
                    "relay_forward_succeeded"
                );
                return AttemptResult::Success(ForwardOutcome {
                    attempt,
                    status: Some(status),
                    succeeded: true,
                });
            }
            Ok(status) => ForwardTransientError {
                attempt,
                status: Some(status),
                kind: TransientKind::Status,
                detail: format!("local service answered {status}"),
            },
            Err(failure) => ForwardTransientError {
                attempt,
                status: None,
                kind: failure.kind,
                detail: failure.detail,
            },
        };

        let outcome = ForwardOutcome {
            attempt,
            status: error.status,
            succeeded: false,
        };

        if attempt >= self.max_attempts {
            warn!(
                message_id = %request.message_id,
                attempt = attempt,
                status_code = ?error.status,
                failure = error.kind.as_str(),
                error = %error,
                elapsed_ms = elapsed_ms,
                "relay_forward_exhausted"
            );
            return AttemptResult::Exhausted {
                outcome,
                error: ForwardExhaustedError {
                    attempts: attempt,
                    last: error,
                },
            };
        }

        let wait = self.backoff.delay(attempt);
        warn!(
            message_id = %request.message_id,
            attempt = attempt,
            max_attempts = self.max_attempts,
            status_code = ?error.status,
            failure = error.kind.as_str(),
            error = %error,
            elapsed_ms = elapsed_ms,
            retry_in_ms = wait.as_millis() as u64,
            "relay_forward_retrying"
        );
        AttemptResult::Retry {
            outcome,
            error,
            wait,
        }
    }

    /// Run attempts until success, exhaustion, or cancellation during a wait.
    ///
    /// An attempt already in progress when `cancel` fires runs to completion;
    /// only backoff waits are cut short.
    pub async fn forward(
        &self,
        request: &ForwardRequest,
        cancel: &CancellationToken,
        hook: &mut dyn RetryHook,
    ) -> ForwardReport {
        let mut outcomes = Vec::new();
        let mut waits = Vec::new();
        let mut attempt = 1;

        loop {
            hook.before_attempt(attempt).await;

            let (wait, outcome) = match self.attempt(request, attempt).await {
                AttemptResult::Success(outcome) => {
                    outcomes.push(outcome);
                    return ForwardReport {
                        outcomes,
                        waits,
                        result: ForwardResult::Delivered,
                    };
                }
                AttemptResult::Exhausted { outcome, error } => {
                    outcomes.push(outcome);
                    return ForwardReport {
                        outcomes,
                        waits,
                        result: ForwardResult::Exhausted(error),
                    };
                }
                AttemptResult::Retry { outcome, wait, .. } => (wait, outcome),
            };
            outcomes.push(outcome);

            if cancel.is_cancelled() {
                return interrupted(request, outcomes, waits);
            }

            hook.before_wait(attempt, wait).await;
            waits.push(wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return interrupted(request, outcomes, waits);
                }
            }

            attempt += 1;
        }
    }
}

fn interrupted(
    request: &ForwardRequest,
    outcomes: Vec<ForwardOutcome>,
    waits: Vec<Duration>,
) -> ForwardReport {
    info!(
        message_id = %request.message_id,
        attempts = outcomes.len(),
        "relay_forward_interrupted"
    );
    ForwardReport {
        outcomes,
        waits,
        result: ForwardResult::Interrupted,
    }
}
