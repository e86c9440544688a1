//! Shared fakes for relay integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use hookrelay::{
    ForwardRequest, LocalTarget, QueueClient, QueueTransportError, QueuedMessage, RelayConfig,
    TransportFailure,
};

pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::new(
        "https://sqs.eu-west-1.amazonaws.com/000000000000/hooks",
        Url::parse("http://127.0.0.1:4000/hooks").unwrap(),
    );
    config.poll_wait = Duration::from_secs(2);
    config.backoff_base = Duration::from_millis(200);
    config.backoff_max = Duration::from_secs(5);
    config.backoff_jitter = 0.0;
    config.drain_timeout = Duration::from_secs(10);
    config
}

/// Queue serving scripted batches; empty long-polls once the script runs out.
#[derive(Default)]
pub struct ScriptedQueue {
    batches: Mutex<VecDeque<Vec<QueuedMessage>>>,
    receives: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_batch(&self, batch: Vec<QueuedMessage>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn receive_messages(
        &self,
        max_batch: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueuedMessage>, QueueTransportError> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(mut batch) => {
                batch.truncate(max_batch);
                Ok(batch)
            }
            None => {
                tokio::time::sleep(wait_time).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueTransportError> {
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueTransportError> {
        if timeout.is_zero() {
            self.released.lock().unwrap().push(receipt_handle.to_string());
        }
        Ok(())
    }
}

/// A recorded call to the local service.
#[derive(Debug, Clone)]
pub struct Call {
    pub message_id: String,
    pub started: Instant,
    pub finished: Instant,
    pub status: u16,
}

/// Local service with a fixed latency that answers from a script.
pub struct SlowService {
    latency: Duration,
    script: Mutex<VecDeque<u16>>,
    fallback: u16,
    calls: Mutex<Vec<Call>>,
}

impl SlowService {
    pub fn new(latency: Duration, script: Vec<u16>, fallback: u16) -> Arc<Self> {
        Arc::new(Self {
            latency,
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTarget for SlowService {
    async fn send(&self, request: &ForwardRequest) -> Result<u16, TransportFailure> {
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;
        let status = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        self.calls.lock().unwrap().push(Call {
            message_id: request.message_id.clone(),
            started,
            finished: Instant::now(),
            status,
        });
        Ok(status)
    }
}
