//! Queue poller: long-polls SQS and dispatches deliveries to pipelines.
//!
//! This module:
//! 1. Waits for a free concurrency slot
//! 2. Long-polls for at most as many messages as there are free slots
//! 3. Spawns one pipeline per message, each holding a slot until it finishes
//! 4. Backs off on poll errors, retrying until cancelled
//!
//! The poller never drains. Once the cancellation token fires it finishes the
//! receive in progress, releases anything that receive returned, and leaves
//! the spawned pipelines in the caller's `JoinSet`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::context::RelayContext;
use crate::forward::Backoff;
use crate::pipeline::{process_message, PipelineReport};
use crate::queue::QueuedMessage;

/// Upper bound for the wait between failed polls.
pub const MAX_POLL_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Counters reported when the poller stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub polls: u64,
    pub poll_errors: u64,
    pub dispatched: u64,
    pub finished: u64,
    /// Received but not dispatched because shutdown started first
    pub released: u64,
}

/// Wait schedule after consecutive failed polls: doubles from
/// `poll_error_backoff` up to [`MAX_POLL_ERROR_BACKOFF`].
pub fn poll_error_backoff(config: &RelayConfig) -> Backoff {
    Backoff::new(config.poll_error_backoff, MAX_POLL_ERROR_BACKOFF, 0.0)
}

/// Poll until `ctx.cancel` fires, spawning pipelines into `tasks`.
pub async fn run(ctx: &Arc<RelayContext>, tasks: &mut JoinSet<PipelineReport>) -> PollerStats {
    let config = &ctx.config;
    let error_backoff = poll_error_backoff(config);
    let slots = ctx.slots();
    let mut stats = PollerStats::default();
    let mut consecutive_errors: u32 = 0;

    info!(
        max_batch = config.max_batch_size,
        wait_secs = config.poll_wait.as_secs(),
        max_in_flight = config.max_in_flight,
        "relay_poller_started"
    );

    loop {
        stats.finished += reap(tasks);

        if ctx.cancel.is_cancelled() {
            break;
        }

        // Never receive more than can start right away; extra messages would
        // sit invisible to other consumers while waiting for a slot.
        let free = tokio::select! {
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => {
                    let free = slots.available_permits() + 1;
                    drop(permit);
                    free
                }
                Err(e) => {
                    error!(error = %e, "relay_slots_closed");
                    break;
                }
            },
            _ = ctx.cancel.cancelled() => break,
        };
        let batch_size = free.min(config.max_batch_size);

        debug!(batch_size = batch_size, in_flight = ctx.in_flight(), "relay_poll_start");

        // A receive in progress is allowed to finish (bounded by the poll
        // wait) so its batch can be released instead of lost.
        let result = ctx.queue.receive_messages(batch_size, config.poll_wait).await;
        stats.polls += 1;

        let messages = match result {
            Ok(messages) => {
                if consecutive_errors > 0 {
                    info!(
                        previous_errors = consecutive_errors,
                        "relay_poll_recovered"
                    );
                }
                consecutive_errors = 0;
                messages
            }
            Err(e) => {
                stats.poll_errors += 1;
                consecutive_errors = consecutive_errors.saturating_add(1);
                let wait = error_backoff.delay(consecutive_errors);
                error!(
                    error = %e,
                    consecutive_errors = consecutive_errors,
                    backoff_ms = wait.as_millis() as u64,
                    "relay_poll_failed"
                );
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = ctx.cancel.cancelled() => break,
                }
                continue;
            }
        };

        if messages.is_empty() {
            debug!("relay_poll_empty");
            continue;
        }

        if ctx.cancel.is_cancelled() {
            stats.released += release(ctx, messages.into_iter()).await;
            break;
        }

        let received_at = Instant::now();
        info!(count = messages.len(), "relay_batch_received");

        let mut pending = messages.into_iter();
        while let Some(message) = pending.next() {
            let permit = tokio::select! {
                permit = slots.clone().acquire_owned() => permit,
                _ = ctx.cancel.cancelled() => {
                    stats.released += release(ctx, std::iter::once(message).chain(pending.by_ref())).await;
                    break;
                }
            };
            let Ok(permit) = permit else {
                error!("relay_slots_closed");
                stats.released += release(ctx, std::iter::once(message).chain(pending.by_ref())).await;
                break;
            };

            let guard = ctx.track(permit);
            let pipeline_ctx = Arc::clone(ctx);
            debug!(message_id = %message.id, in_flight = ctx.in_flight(), "relay_message_dispatched");
            tasks.spawn(async move {
                let _guard = guard;
                process_message(&pipeline_ctx, message, received_at).await
            });
            stats.dispatched += 1;
        }
    }

    info!(
        polls = stats.polls,
        poll_errors = stats.poll_errors,
        dispatched = stats.dispatched,
        released = stats.released,
        in_flight = tasks.len(),
        "relay_poller_stopped"
    );
    stats
}

/// Collect pipelines that already finished. Returns how many were collected.
fn reap(tasks: &mut JoinSet<PipelineReport>) -> u64 {
    let mut finished = 0;
    while let Some(result) = tasks.try_join_next() {
        log_finished(result);
        finished += 1;
    }
    finished
}

pub(crate) fn log_finished(result: Result<PipelineReport, JoinError>) {
    match result {
        Ok(report) => debug!(
            message_id = %report.message_id,
            outcome = report.outcome,
            attempts = report.attempts,
            "relay_pipeline_finished"
        ),
        Err(e) if e.is_panic() => error!(error = %e, "relay_pipeline_panicked"),
        Err(e) => warn!(error = %e, "relay_pipeline_aborted"),
    }
}

/// Hand undispatched messages back to the queue right away.
async fn release<I>(ctx: &RelayContext, messages: I) -> u64
where
    I: Iterator<Item = QueuedMessage>,
{
    let mut released = 0;
    for message in messages {
        if let Err(e) = ctx
            .queue
            .extend_visibility(&message.receipt_handle, Duration::ZERO)
            .await
        {
            warn!(message_id = %message.id, error = %e, "relay_message_release_failed");
        } else {
            debug!(message_id = %message.id, "relay_message_released");
        }
        released += 1;
    }
    released
}
