//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::config::RelayConfig;
use crate::error::{QueueTransportError, TransportFailure};
use crate::forward::{ForwardRequest, LocalTarget};
use crate::queue::{QueueClient, QueuedMessage};

pub(crate) fn test_config() -> RelayConfig {
    let mut config = RelayConfig::new(
        "https://sqs.us-east-1.amazonaws.com/123/webhooks",
        Url::parse("http://127.0.0.1:3000/webhook").unwrap(),
    );
    config.backoff_base = Duration::from_millis(100);
    config.backoff_max = Duration::from_secs(2);
    config.backoff_jitter = 0.0;
    config.poll_wait = Duration::from_secs(1);
    config.poll_error_backoff = Duration::from_millis(200);
    config.drain_timeout = Duration::from_secs(5);
    config
}

/// Queue that serves scripted batches, then empty long-polls.
#[derive(Default)]
pub(crate) struct FakeQueue {
    batches: Mutex<VecDeque<(Duration, Result<Vec<QueuedMessage>, QueueTransportError>)>>,
    receives: AtomicUsize,
    receive_times: Mutex<Vec<Instant>>,
    deleted: Mutex<Vec<String>>,
    extended: Mutex<Vec<(String, Duration)>>,
    fail_delete: AtomicBool,
    fail_extend: AtomicBool,
}

impl FakeQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_batch(&self, batch: Vec<QueuedMessage>) {
        self.push_batch_after(Duration::ZERO, batch);
    }

    /// Serve `batch` from a receive that takes `delay` to answer.
    pub fn push_batch_after(&self, delay: Duration, batch: Vec<QueuedMessage>) {
        self.batches.lock().unwrap().push_back((delay, Ok(batch)));
    }

    pub fn push_error(&self, message: &str) {
        self.batches
            .lock()
            .unwrap()
            .push_back((Duration::ZERO, Err(QueueTransportError::new("receive", message))));
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_extends(&self, fail: bool) {
        self.fail_extend.store(fail, Ordering::SeqCst);
    }

    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    /// When each receive call started.
    pub fn receive_times(&self) -> Vec<Instant> {
        self.receive_times.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn extended(&self) -> Vec<(String, Duration)> {
        self.extended.lock().unwrap().clone()
    }

    pub fn extend_calls(&self) -> usize {
        self.extended.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn receive_messages(
        &self,
        max_batch: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueTransportError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        self.receive_times.lock().unwrap().push(Instant::now());
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result.map(|mut batch| {
                    batch.truncate(max_batch);
                    batch
                })
            }
            None => {
                tokio::time::sleep(wait_time).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueTransportError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(QueueTransportError::new("delete", "ReceiptHandleIsInvalid"));
        }
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueTransportError> {
        self.extended
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), timeout));
        if self.fail_extend.load(Ordering::SeqCst) {
            return Err(QueueTransportError::new("extend_visibility", "MessageNotInflight"));
        }
        Ok(())
    }
}

/// Local service that answers from a script, then with `fallback`.
pub(crate) struct FakeTarget {
    script: Mutex<VecDeque<Result<u16, TransportFailure>>>,
    fallback: u16,
    latency: Duration,
    requests: Mutex<Vec<ForwardRequest>>,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new(), 200, Duration::ZERO)
    }

    pub fn scripted(
        script: Vec<Result<u16, TransportFailure>>,
        fallback: u16,
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            latency,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ForwardRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTarget for FakeTarget {
    async fn send(&self, request: &ForwardRequest) -> Result<u16, TransportFailure> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(self.fallback))
    }
}
