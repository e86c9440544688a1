//! `HttpTarget` against a real local HTTP server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use tokio::net::TcpListener;
use url::Url;

use hookrelay::{
    Decoder, HttpTarget, LocalTarget, QueuedMessage, RelayConfig, TransientKind,
};

#[derive(Clone, Debug)]
struct ReceivedRequest {
    headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Clone)]
struct LocalService {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    status: Arc<AtomicU16>,
}

impl LocalService {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = Self {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        };

        let app = Router::new()
            .route("/hooks", post(capture))
            .with_state(service.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        service
    }

    fn url(&self) -> Url {
        Url::parse(&format!("http://{}/hooks", self.addr)).unwrap()
    }

    fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

async fn capture(
    State(service): State<LocalService>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    service.received.lock().unwrap().push(ReceivedRequest {
        headers,
        body: body.to_vec(),
    });
    StatusCode::from_u16(service.status.load(Ordering::SeqCst)).unwrap()
}

fn decoder_for(url: Url) -> Decoder {
    let config = RelayConfig::new("https://sqs.us-east-1.amazonaws.com/1/hooks", url);
    Decoder::from_config(&config)
}

#[tokio::test]
async fn test_replays_exact_bytes_and_headers() {
    let service = LocalService::start().await;
    let target = HttpTarget::new(Duration::from_secs(5)).unwrap();

    // Non-UTF-8 payload survives the base64 round trip untouched.
    let payload: Vec<u8> = vec![0x1f, 0x8b, 0x00, 0xff, b'{', b'}', 0x80];
    let message = QueuedMessage::new("m1", "rh-1", general_purpose::STANDARD.encode(&payload))
        .with_attribute("BodyIsBase64", "true")
        .with_attribute("Content-Type", "application/octet-stream")
        .with_attribute("X-GitHub-Event", "push")
        .with_attribute("X-GitHub-Delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .with_attribute("X-Hub-Signature-256", "sha256=abc123");
    let request = decoder_for(service.url()).decode(&message).unwrap();

    let status = target.send(&request).await.unwrap();
    assert_eq!(status, 200);

    let received = service.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, payload);
    let headers = &received[0].headers;
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(headers["x-github-event"], "push");
    assert_eq!(headers["x-github-delivery"], "72d3162e-cc78-11e3-81ab-4c9367dc0958");
    assert_eq!(headers["x-hub-signature-256"], "sha256=abc123");
}

#[tokio::test]
async fn test_missing_attributes_are_simply_absent() {
    let service = LocalService::start().await;
    let target = HttpTarget::new(Duration::from_secs(5)).unwrap();
    let message = QueuedMessage::new("m1", "rh-1", r#"{"zen":"Design for failure."}"#);
    let request = decoder_for(service.url()).decode(&message).unwrap();

    target.send(&request).await.unwrap();

    let received = service.received();
    assert_eq!(received[0].body, br#"{"zen":"Design for failure."}"#.to_vec());
    assert!(received[0].headers.get("x-github-event").is_none());
    assert!(received[0].headers.get("x-hub-signature-256").is_none());
    assert_eq!(received[0].headers["content-type"], "application/json");
}

#[tokio::test]
async fn test_error_statuses_are_passed_through() {
    let service = LocalService::start().await;
    let target = HttpTarget::new(Duration::from_secs(5)).unwrap();
    let request = decoder_for(service.url())
        .decode(&QueuedMessage::new("m1", "rh-1", "{}"))
        .unwrap();

    service.respond_with(500);
    assert_eq!(target.send(&request).await.unwrap(), 500);
    service.respond_with(404);
    assert_eq!(target.send(&request).await.unwrap(), 404);
}

#[tokio::test]
async fn test_refused_connection_is_a_connect_failure() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/hooks")).unwrap();
    let target = HttpTarget::new(Duration::from_secs(5)).unwrap();
    let request = decoder_for(url)
        .decode(&QueuedMessage::new("m1", "rh-1", "{}"))
        .unwrap();

    let failure = target.send(&request).await.unwrap_err();
    assert_eq!(failure.kind, TransientKind::Connect);
}
