//! Runtime context shared by the poller and every pipeline.
//!
//! Built once at startup and passed around behind an `Arc`. Holds the
//! immutable configuration, the shared clients, the concurrency slots and the
//! process-wide cancellation token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::ack::Acknowledger;
use crate::config::RelayConfig;
use crate::decode::Decoder;
use crate::forward::{ForwardingClient, LocalTarget};
use crate::queue::QueueClient;

pub struct RelayContext {
    pub config: Arc<RelayConfig>,
    pub queue: Arc<dyn QueueClient>,
    pub decoder: Decoder,
    pub forwarder: ForwardingClient,
    pub acknowledger: Acknowledger,
    pub cancel: CancellationToken,
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl RelayContext {
    pub fn new(
        config: RelayConfig,
        queue: Arc<dyn QueueClient>,
        target: Arc<dyn LocalTarget>,
    ) -> Self {
        let decoder = Decoder::from_config(&config);
        let forwarder = ForwardingClient::from_config(target, &config);
        let acknowledger = Acknowledger::new(queue.clone(), config.poison_receive_count);
        let slots = Arc::new(Semaphore::new(config.max_in_flight));

        Self {
            config: Arc::new(config),
            queue,
            decoder,
            forwarder,
            acknowledger,
            cancel: CancellationToken::new(),
            slots,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pipelines currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Slots not taken by a running pipeline.
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub(crate) fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    /// Account for one dispatched pipeline until the returned guard drops.
    pub(crate) fn track(&self, permit: OwnedSemaphorePermit) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Holds a concurrency slot for one pipeline, released on drop, panics included.
pub(crate) struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
