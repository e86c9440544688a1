//! Local HTTP collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, enabled, Level};

use super::ForwardRequest;
use crate::error::{TransientKind, TransportFailure};
use crate::util::preview::preview_str;

/// The service webhooks are replayed against.
///
/// Returns the response status code; the response body plays no part in the
/// relay's decisions.
#[async_trait]
pub trait LocalTarget: Send + Sync {
    async fn send(&self, request: &ForwardRequest) -> Result<u16, TransportFailure>;
}

/// [`LocalTarget`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTarget {
    client: Client,
    timeout: Duration,
}

impl HttpTarget {
    /// Build a target with its own connection pool.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().pool_max_idle_per_host(16).build()?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl LocalTarget for HttpTarget {
    async fn send(&self, request: &ForwardRequest) -> Result<u16, TransportFailure> {
        let response = self
            .client
            .request(request.method.clone(), request.target_url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status().as_u16();

        if enabled!(Level::DEBUG) {
            match response.text().await {
                Ok(text) if !text.is_empty() => debug!(
                    message_id = %request.message_id,
                    status_code = status,
                    body = %preview_str(&text, 200),
                    "relay_local_response_body"
                ),
                Ok(_) => {}
                Err(e) => debug!(
                    message_id = %request.message_id,
                    error = %e,
                    "relay_local_response_unreadable"
                ),
            }
        }

        Ok(status)
    }
}

fn classify(err: &reqwest::Error) -> TransportFailure {
    let kind = if err.is_timeout() {
        TransientKind::Timeout
    } else if err.is_connect() {
        TransientKind::Connect
    } else {
        TransientKind::Transport
    };
    TransportFailure::new(kind, err.to_string())
}
