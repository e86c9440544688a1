//! Per-message pipeline: decode → forward → acknowledge.
//!
//! Steps run strictly in order for one message. Nothing here is shared with
//! other pipelines except the read-only context, so redeliveries of the same
//! message are processed independently.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::ack::{AckAction, Disposition};
use crate::context::RelayContext;
use crate::forward::ForwardResult;
use crate::queue::QueuedMessage;
use crate::util::preview::summarize_payload;
use crate::visibility::VisibilityExtender;

/// Summary of one processed delivery.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub message_id: String,
    pub receipt_handle: String,
    /// `delivered`, `decode_failed`, `exhausted` or `interrupted`
    pub outcome: &'static str,
    pub attempts: u32,
    pub waits: Vec<Duration>,
    pub visibility_extensions: u32,
    pub ack: AckAction,
}

/// Process one delivery received at `received_at`.
pub async fn process_message(
    ctx: &RelayContext,
    message: QueuedMessage,
    received_at: Instant,
) -> PipelineReport {
    info!(
        message_id = %message.id,
        receive_count = message.approx_receive_count,
        attributes = message.attributes.len(),
        body_length = message.body.len(),
        "relay_message_received"
    );

    let request = match ctx.decoder.decode(&message) {
        Ok(request) => request,
        Err(e) => {
            let disposition = Disposition::DecodeFailed(e);
            let ack = ctx.acknowledger.settle(&message, &disposition).await;
            return PipelineReport {
                message_id: message.id,
                receipt_handle: message.receipt_handle,
                outcome: disposition.as_str(),
                attempts: 0,
                waits: Vec::new(),
                visibility_extensions: 0,
                ack,
            };
        }
    };

    info!(
        message_id = %message.id,
        summary = %summarize_payload(&request.body),
        target = %request.target_url,
        headers = request.headers.len(),
        body_bytes = request.body.len(),
        forwarded_for = ?request.headers.get("x-forwarded-for"),
        "relay_forwarding"
    );

    let mut extender = VisibilityExtender::new(ctx.queue.clone(), &message, received_at, &ctx.config);
    let report = ctx
        .forwarder
        .forward(&request, &ctx.cancel, &mut extender)
        .await;

    let disposition = match report.result {
        ForwardResult::Delivered => Disposition::Delivered,
        ForwardResult::Exhausted(ref e) => Disposition::Exhausted(e.clone()),
        ForwardResult::Interrupted => Disposition::Interrupted,
    };
    let ack = ctx.acknowledger.settle(&message, &disposition).await;

    info!(
        message_id = %message.id,
        outcome = disposition.as_str(),
        attempts = report.attempts(),
        visibility_extensions = extender.extensions(),
        elapsed_ms = received_at.elapsed().as_millis() as u64,
        ack = ?ack,
        "relay_message_done"
    );

    PipelineReport {
        message_id: message.id,
        receipt_handle: message.receipt_handle,
        outcome: disposition.as_str(),
        attempts: report.attempts(),
        waits: report.waits,
        visibility_extensions: extender.extensions(),
        ack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, FakeQueue, FakeTarget};
    use base64::{engine::general_purpose, Engine as _};
    use std::sync::Arc;

    fn context(queue: Arc<FakeQueue>, target: Arc<FakeTarget>) -> RelayContext {
        RelayContext::new(test_config(), queue, target)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_deletes_once_without_waits() {
        let queue = FakeQueue::new();
        let target = FakeTarget::new();
        let ctx = context(queue.clone(), target.clone());

        let report =
            process_message(&ctx, QueuedMessage::new("m1", "rh-1", "{}"), Instant::now()).await;

        assert_eq!(report.outcome, "delivered");
        assert_eq!(report.attempts, 1);
        assert!(report.waits.is_empty());
        assert_eq!(report.ack, AckAction::Deleted);
        assert_eq!(queue.deleted(), vec!["rh-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_deletes_after_third_attempt() {
        let queue = FakeQueue::new();
        let target = FakeTarget::scripted(vec![Ok(500), Ok(500)], 200, Duration::ZERO);
        let ctx = context(queue.clone(), target.clone());

        let report =
            process_message(&ctx, QueuedMessage::new("m1", "rh-1", "{}"), Instant::now()).await;

        assert_eq!(report.attempts, 3);
        assert_eq!(report.waits.len(), 2);
        assert!(report.waits[0] < report.waits[1]);
        assert_eq!(target.requests().len(), 3);
        assert_eq!(queue.deleted(), vec!["rh-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_message_is_kept() {
        let queue = FakeQueue::new();
        let target = FakeTarget::scripted(Vec::new(), 502, Duration::ZERO);
        let ctx = context(queue.clone(), target.clone());

        let report =
            process_message(&ctx, QueuedMessage::new("m1", "rh-1", "{}"), Instant::now()).await;

        assert_eq!(report.outcome, "exhausted");
        assert_eq!(report.attempts, ctx.config.max_attempts);
        assert_eq!(report.ack, AckAction::Retained);
        assert!(queue.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_message_is_never_forwarded() {
        let queue = FakeQueue::new();
        let target = FakeTarget::new();
        let ctx = context(queue.clone(), target.clone());
        let message =
            QueuedMessage::new("m1", "rh-1", "%%%").with_attribute("BodyIsBase64", "true");

        let report = process_message(&ctx, message, Instant::now()).await;

        assert_eq!(report.outcome, "decode_failed");
        assert_eq!(report.attempts, 0);
        assert!(target.requests().is_empty());
        assert!(queue.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_decoded_bytes() {
        let queue = FakeQueue::new();
        let target = FakeTarget::new();
        let ctx = context(queue, target.clone());
        let payload = br#"{"zen":"Keep it logically awesome."}"#;
        let message = QueuedMessage::new("m1", "rh-1", general_purpose::STANDARD.encode(payload))
            .with_attribute("BodyIsBase64", "true")
            .with_attribute("X-GitHub-Event", "ping");

        process_message(&ctx, message, Instant::now()).await;

        let sent = target.requests();
        assert_eq!(&sent[0].body[..], payload);
        assert_eq!(sent[0].headers.get("x-github-event").unwrap(), "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_retries_extend_visibility() {
        let queue = FakeQueue::new();
        let target = FakeTarget::scripted(vec![Ok(500), Ok(500)], 200, Duration::ZERO);
        let mut config = test_config();
        config.visibility_timeout = Duration::from_secs(30);
        config.visibility_safety_margin = Duration::from_secs(5);
        config.request_timeout = Duration::from_secs(5);
        config.backoff_base = Duration::from_secs(15);
        config.backoff_max = Duration::from_secs(60);
        let ctx = RelayContext::new(config, queue.clone(), target);

        let report =
            process_message(&ctx, QueuedMessage::new("m1", "rh-1", "{}"), Instant::now()).await;

        assert_eq!(report.outcome, "delivered");
        assert!(report.visibility_extensions >= 1);
        assert!(queue.extended().iter().all(|(rh, _)| rh == "rh-1"));
    }
}
