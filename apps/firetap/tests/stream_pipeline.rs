//! Stream Pipeline Integration Tests
//!
//! Drives the real feed client against a local mock feed server: scripted
//! response statuses, interactively fed NDJSON bodies, forced recycles, and
//! cancellation mid-stream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use firetap::{FeedClient, FeedClientConfig, OauthSigner, SigningCredentials, WatchTerms};

// =============================================================================
// Mock Feed Server
// =============================================================================

/// What one connection attempt sent.
#[derive(Debug, Clone)]
struct RecordedRequest {
    authorization: String,
    content_type: String,
    body: String,
}

/// Scripted response for one connection attempt.
enum Attempt {
    /// Non-success status with a one-line diagnostic body.
    Reject(StatusCode, &'static str),
    /// Healthy stream fed interactively through the paired sender.
    Stream(mpsc::Receiver<Bytes>),
    /// Healthy stream with a fixed body, then EOF.
    Fixed(&'static str),
}

/// Shared state between the mock server and the test body.
#[derive(Default)]
struct FeedScript {
    requests: Mutex<Vec<RecordedRequest>>,
    attempts: Mutex<VecDeque<Attempt>>,
    /// Senders parked here keep unscripted connections open and idle.
    parked: Mutex<Vec<mpsc::Sender<Bytes>>>,
}

impl FeedScript {
    fn push_attempt(&self, attempt: Attempt) {
        self.attempts.lock().push_back(attempt);
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, index: usize) -> RecordedRequest {
        self.requests.lock()[index].clone()
    }
}

fn streamed_response(rx: mpsc::Receiver<Bytes>) -> Response {
    let stream = ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn handle_filter(
    State(script): State<Arc<FeedScript>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    script.requests.lock().push(RecordedRequest {
        authorization: header("authorization"),
        content_type: header("content-type"),
        body,
    });

    let attempt = script.attempts.lock().pop_front();
    match attempt {
        Some(Attempt::Reject(status, line)) => (status, format!("{line}\n")).into_response(),
        Some(Attempt::Stream(rx)) => streamed_response(rx),
        Some(Attempt::Fixed(body)) => (StatusCode::OK, body).into_response(),
        None => {
            // Unscripted attempt: hold the connection open without data so
            // the client does not churn through redials.
            let (tx, rx) = mpsc::channel(1);
            script.parked.lock().push(tx);
            streamed_response(rx)
        }
    }
}

/// Start the mock feed on a random port; returns the endpoint URL.
async fn start_mock_feed(script: Arc<FeedScript>) -> String {
    let app = Router::new()
        .route("/stream", post(handle_filter))
        .with_state(script);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/stream")
}

fn test_client(endpoint: String, recycle_interval: Duration) -> FeedClient {
    let credentials = SigningCredentials::new("ck", "cs", "at", "ts").unwrap();
    let config = FeedClientConfig {
        endpoint,
        connect_timeout: Duration::from_secs(2),
        recycle_interval,
        delivery_capacity: 1,
    };
    FeedClient::new(config, Arc::new(OauthSigner::new(credentials))).unwrap()
}

fn watch(terms: &[&str]) -> WatchTerms {
    terms.iter().copied().collect()
}

/// Wait until the mock has recorded at least `n` connection attempts.
async fn wait_for_requests(script: &FeedScript, n: usize) {
    timeout(Duration::from_secs(3), async {
        while script.request_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expected connection attempts did not arrive");
}

// =============================================================================
// Decode and Match
// =============================================================================

#[tokio::test]
async fn test_records_flow_annotated_in_order() {
    let script = Arc::new(FeedScript::default());
    let (feed_tx, feed_rx) = mpsc::channel(8);
    script.push_attempt(Attempt::Stream(feed_rx));

    let endpoint = start_mock_feed(Arc::clone(&script)).await;
    let client = test_client(endpoint, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let mut records = client.run(cancel.clone(), watch(&["rust", "monkey"]));

    // Three records, one interleaved keep-alive, split mid-line across
    // chunks to exercise the framer.
    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"I saw a MONKEY today\"}\n\r\n"))
        .await
        .unwrap();
    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"rust and monk"))
        .await
        .unwrap();
    feed_tx
        .send(Bytes::from_static(b"ey\"}\n{\"text\":\"nothing here\"}\n"))
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.text, "I saw a MONKEY today");
    assert_eq!(first.matched_terms, vec!["monkey"]);

    let second = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.matched_terms, vec!["rust", "monkey"]);

    let third = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.text, "nothing here");
    assert!(third.matched_terms.is_empty(), "no match is an empty vec");

    // Exactly one signed request was issued for all three records.
    assert_eq!(script.request_count(), 1);
    let request = script.request(0);
    assert!(request.authorization.starts_with("OAuth "));
    assert_eq!(request.content_type, "application/x-www-form-urlencoded");
    assert_eq!(request.body, "track=rust%2Cmonkey");

    cancel.cancel();
    let end = timeout(Duration::from_secs(2), records.recv()).await.unwrap();
    assert!(end.is_none(), "channel should close after cancellation");
}

// =============================================================================
// Error Recovery
// =============================================================================

#[tokio::test]
async fn test_non_success_then_healthy_recovers() {
    let script = Arc::new(FeedScript::default());
    let (feed_tx, feed_rx) = mpsc::channel(8);
    script.push_attempt(Attempt::Reject(StatusCode::from_u16(420).unwrap(), "Enhance Your Calm"));
    script.push_attempt(Attempt::Reject(StatusCode::TOO_MANY_REQUESTS, "slow down"));
    script.push_attempt(Attempt::Stream(feed_rx));

    let endpoint = start_mock_feed(Arc::clone(&script)).await;
    let client = test_client(endpoint, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let mut records = client.run(cancel.clone(), watch(&["cat"]));

    // Two rejects are retried immediately; the third attempt streams.
    wait_for_requests(&script, 3).await;

    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"a cat appeared\"}\n"))
        .await
        .unwrap();

    let record = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .expect("records should flow after a rejected attempt");
    assert_eq!(record.matched_terms, vec!["cat"]);

    // Every attempt re-sends the same filter body with a fresh signature.
    let first = script.request(0);
    let third = script.request(2);
    assert_eq!(first.body, "track=cat");
    assert_eq!(third.body, first.body);
    assert_ne!(third.authorization, first.authorization);

    cancel.cancel();
    assert!(
        timeout(Duration::from_secs(2), records.recv())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_stream_end_triggers_immediate_redial() {
    let script = Arc::new(FeedScript::default());
    let (feed_tx, feed_rx) = mpsc::channel(8);
    script.push_attempt(Attempt::Fixed("{\"text\":\"first connection\"}\n"));
    script.push_attempt(Attempt::Stream(feed_rx));

    let endpoint = start_mock_feed(Arc::clone(&script)).await;
    let client = test_client(endpoint, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let mut records = client.run(cancel.clone(), watch(&["connection"]));

    let first = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.text, "first connection");

    // The fixed body ends in EOF; the pump must redial without delay.
    wait_for_requests(&script, 2).await;

    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"second connection\"}\n"))
        .await
        .unwrap();

    let second = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.text, "second connection");
    assert_eq!(second.matched_terms, vec!["connection"]);

    cancel.cancel();
    assert!(
        timeout(Duration::from_secs(2), records.recv())
            .await
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// Recycle
// =============================================================================

#[tokio::test]
async fn test_recycle_discards_partial_record_and_redials() {
    let script = Arc::new(FeedScript::default());
    let (first_tx, first_rx) = mpsc::channel(8);
    let (second_tx, second_rx) = mpsc::channel(8);
    script.push_attempt(Attempt::Stream(first_rx));
    script.push_attempt(Attempt::Stream(second_rx));

    let endpoint = start_mock_feed(Arc::clone(&script)).await;
    let client = test_client(endpoint, Duration::from_millis(400));
    let cancel = CancellationToken::new();
    let mut records = client.run(cancel.clone(), watch(&["whole"]));

    // A record left unterminated when the recycler severs the connection.
    first_tx
        .send(Bytes::from_static(b"{\"text\":\"half a reco"))
        .await
        .unwrap();

    // The recycle forces a second signed request with the same terms.
    wait_for_requests(&script, 2).await;
    assert_eq!(script.request(0).body, script.request(1).body);

    second_tx
        .send(Bytes::from_static(b"{\"text\":\"whole record\"}\n"))
        .await
        .unwrap();

    let record = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.text, "whole record",
        "the severed partial record must never be delivered"
    );

    cancel.cancel();
    assert!(
        timeout(Duration::from_secs(2), records.recv())
            .await
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_closes_channel_mid_record() {
    let script = Arc::new(FeedScript::default());
    let (feed_tx, feed_rx) = mpsc::channel(8);
    script.push_attempt(Attempt::Stream(feed_rx));

    let endpoint = start_mock_feed(Arc::clone(&script)).await;
    let client = test_client(endpoint, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let mut records = client.run(cancel.clone(), watch(&["x"]));

    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"x marks the spot\"}\n"))
        .await
        .unwrap();
    let delivered = timeout(Duration::from_secs(2), records.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.matched_terms, vec!["x"]);

    // Leave a record half-sent, then cancel.
    feed_tx
        .send(Bytes::from_static(b"{\"text\":\"trunc"))
        .await
        .unwrap();
    cancel.cancel();

    let end = timeout(Duration::from_secs(2), records.recv())
        .await
        .expect("channel must close in bounded time");
    assert!(end.is_none(), "no records may follow cancellation");
}
