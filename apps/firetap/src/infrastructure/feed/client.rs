//! Streaming Feed Client
//!
//! The reconnecting stream pump. Each session issues a signed POST to the
//! filter endpoint, validates the response, decodes newline-delimited JSON
//! records, annotates them with the watch terms they contain, and delivers
//! them on a bounded channel.
//!
//! Every way a connection can end (forced recycle, network fault, upstream
//! error status, malformed frame, clean EOF) is handled identically: the
//! loss is logged and counted, then the pump redials immediately. There is
//! no backoff and no attempt cap; cancellation is the only exit, checked
//! once at the top of each iteration.
//!
//! # Severance
//!
//! The pump races every suspension point (request send, body read, channel
//! send) against the current [`ConnectionHandle`] and session cancellation.
//! Severing the handle makes the losing branch drop the in-flight request or
//! response, which closes the underlying connection. This is how the
//! recycler and cancellation reach down to the live socket without owning
//! transport internals.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::framing::{FramingError, LineFramer};
use super::record::Record;
use super::recycler::{ConnectionRecycler, DEFAULT_RECYCLE_INTERVAL, RecyclerConfig};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::domain::terms::WatchTerms;
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::metrics;
use crate::infrastructure::signing::{self, RequestSigner, SigningError};

// =============================================================================
// Constants
// =============================================================================

/// Production filter stream endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://stream.twitter.com/1.1/statuses/filter.json";

/// TCP connect timeout for each attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivery channel capacity.
pub const DEFAULT_DELIVERY_CAPACITY: usize = 1;

/// Form field carrying the joined watch terms.
const FILTER_PARAM: &str = "track";

/// Longest we wait for a diagnostic line from a failed response body.
const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Why a connection attempt ended.
///
/// None of these are fatal to the session except [`FeedError::ChannelClosed`];
/// everything else triggers an immediate redial. Nothing is surfaced to the
/// consumer as an error value; the channel's open/closed state is the only
/// caller-visible signal.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The request could not be signed.
    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Transport-level failure: dial, TLS, timeout, reset.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a status other than 200.
    #[error("upstream status {status}: {diagnostic}")]
    Status {
        /// The HTTP status line.
        status: reqwest::StatusCode,
        /// First body line of the failed response, if one arrived in time.
        diagnostic: String,
    },

    /// A frame was not a valid JSON record.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A frame exceeded limits or was not valid UTF-8.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The connection was severed by the recycler or by cancellation.
    #[error("connection severed")]
    Severed,

    /// The upstream closed the response body.
    #[error("stream ended")]
    StreamEnd,

    /// The consumer dropped the receiver.
    #[error("delivery channel closed by consumer")]
    ChannelClosed,
}

impl FeedError {
    /// Metric label for this loss kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Signing(_) => "signing",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::Framing(_) => "framing",
            Self::Severed => "severed",
            Self::StreamEnd => "stream_end",
            Self::ChannelClosed => "channel_closed",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Filter stream endpoint URL (no query string).
    pub endpoint: String,
    /// TCP connect timeout per attempt.
    pub connect_timeout: Duration,
    /// Interval between forced connection recycles.
    pub recycle_interval: Duration,
    /// Delivery channel capacity (minimum 1).
    pub delivery_capacity: usize,
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recycle_interval: DEFAULT_RECYCLE_INTERVAL,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
        }
    }
}

impl From<&FeedConfig> for FeedClientConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            connect_timeout: config.stream.connect_timeout,
            recycle_interval: config.stream.recycle_interval,
            delivery_capacity: config.stream.delivery_capacity,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Filtered-stream client.
///
/// Holds the HTTP client and signer shared by all sessions; each [`run`]
/// call starts an independent session with its own registry, recycler, and
/// delivery channel.
///
/// [`run`]: FeedClient::run
pub struct FeedClient {
    config: FeedClientConfig,
    http: reqwest::Client,
    signer: Arc<dyn RequestSigner>,
}

impl FeedClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: FeedClientConfig,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            config,
            http,
            signer,
        })
    }

    /// Start one streaming session.
    ///
    /// Spawns the pump and the recycler and returns the delivery channel
    /// receiver. The channel is closed exactly once, only after the session
    /// has permanently stopped. Cancelling `cancel` ends the session; so
    /// does dropping the receiver. A stopped session cannot be restarted;
    /// call `run` again.
    #[must_use]
    pub fn run(&self, cancel: CancellationToken, terms: WatchTerms) -> mpsc::Receiver<Record> {
        let capacity = self.config.delivery_capacity.max(1);
        let (delivery, receiver) = mpsc::channel(capacity);
        let registry = Arc::new(ConnectionRegistry::new());

        tracing::info!(
            terms = terms.len(),
            capacity,
            recycle_interval_secs = self.config.recycle_interval.as_secs(),
            "Starting streaming session"
        );

        // The session token propagates caller cancellation and lets the pump
        // stop the recycler when it exits for its own reasons.
        let session = cancel.child_token();

        let recycler = ConnectionRecycler::new(
            RecyclerConfig::new(self.config.recycle_interval),
            Arc::clone(&registry),
            session.clone(),
        );
        tokio::spawn(recycler.run());

        let pump = StreamSession {
            config: self.config.clone(),
            http: self.http.clone(),
            signer: Arc::clone(&self.signer),
            registry,
            cancel: session,
            terms,
            delivery,
        };
        tokio::spawn(pump.run());

        receiver
    }
}

// =============================================================================
// Session
// =============================================================================

/// Run-state of one session: registry, cancellation, terms, and the sender
/// half of the delivery channel. Dropped when the pump task ends, which
/// closes the channel.
struct StreamSession {
    config: FeedClientConfig,
    http: reqwest::Client,
    signer: Arc<dyn RequestSigner>,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
    terms: WatchTerms,
    delivery: mpsc::Sender<Record>,
}

impl StreamSession {
    /// The pump loop. Ends only on cancellation or a dropped receiver.
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.delivery.is_closed() {
                tracing::debug!("Receiver dropped, ending session");
                break;
            }

            let reason = self.stream_once().await;
            metrics::record_connection_loss(reason.kind());

            match &reason {
                FeedError::ChannelClosed => {
                    tracing::debug!("Receiver dropped mid-delivery, ending session");
                    break;
                }
                FeedError::Severed => {
                    tracing::debug!("Connection severed, redialing");
                }
                reason => {
                    tracing::warn!(error = %reason, "Connection lost, redialing");
                }
            }
        }

        // Both the pump and the recycler close the current handle on the way
        // out; whichever runs second is a no-op.
        self.registry.close_current();
        self.cancel.cancel();
        tracing::info!("Streaming session ended");
    }

    /// One full connection attempt, from signing to the end of decoding.
    /// Always returns the reason the connection ended.
    async fn stream_once(&self) -> FeedError {
        let joined = self.terms.joined();
        let params = [(FILTER_PARAM, joined.as_str())];
        let body = form_body(&joined);

        let authorization =
            match self
                .signer
                .authorization("POST", &self.config.endpoint, &params)
            {
                Ok(header) => header,
                Err(e) => return e.into(),
            };

        // Register the new connection before any network activity so the
        // recycler and cancellation can sever this attempt from the start.
        // Opening also closes any handle left over from a prior attempt.
        let handle = self.registry.open();
        metrics::record_connection_opened();
        tracing::debug!(connection_id = handle.id(), "Opening filter stream");

        let request = self
            .http
            .post(&self.config.endpoint)
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::CONTENT_LENGTH, body.len())
            .body(body);

        let response = tokio::select! {
            () = self.cancel.cancelled() => return FeedError::Severed,
            () = handle.closed() => return FeedError::Severed,
            result = request.send() => match result {
                Ok(response) => response,
                Err(e) => return e.into(),
            },
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let diagnostic = self.read_diagnostic_line(response, &handle).await;
            return FeedError::Status { status, diagnostic };
        }

        self.decode_stream(response, &handle).await
    }

    /// Decode records off an established stream until the connection ends.
    async fn decode_stream(
        &self,
        response: reqwest::Response,
        handle: &ConnectionHandle,
    ) -> FeedError {
        tracing::info!(connection_id = handle.id(), "Filter stream established");

        let mut framer = LineFramer::new();
        let mut stream = response.bytes_stream();

        loop {
            // Drain every complete line already buffered before reading more.
            loop {
                let line = match framer.next_line() {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => return e.into(),
                };

                let record = match Record::from_json(&line) {
                    Ok(record) => record.annotated(&self.terms),
                    Err(e) => return e.into(),
                };

                if let Err(reason) = self.deliver(record, handle).await {
                    return reason;
                }
            }

            let chunk = tokio::select! {
                () = self.cancel.cancelled() => return FeedError::Severed,
                () = handle.closed() => return FeedError::Severed,
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(chunk)) => framer.push(&chunk),
                Some(Err(e)) => return e.into(),
                None => {
                    if framer.buffered() > 0 {
                        tracing::debug!(
                            connection_id = handle.id(),
                            discarded_bytes = framer.buffered(),
                            "Stream ended mid-record, discarding partial frame"
                        );
                    }
                    return FeedError::StreamEnd;
                }
            }
        }
    }

    /// Send one annotated record, racing severance and cancellation.
    ///
    /// A slow consumer stalls decoding of the current connection here; the
    /// stalled send is abandoned by the next severance event.
    async fn deliver(&self, record: Record, handle: &ConnectionHandle) -> Result<(), FeedError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(FeedError::Severed),
            () = handle.closed() => Err(FeedError::Severed),
            sent = self.delivery.send(record) => match sent {
                Ok(()) => {
                    metrics::record_record_delivered();
                    Ok(())
                }
                Err(_) => Err(FeedError::ChannelClosed),
            },
        }
    }

    /// Pull the first body line of a failed response for the log, bounded by
    /// time, severance, and cancellation.
    async fn read_diagnostic_line(
        &self,
        response: reqwest::Response,
        handle: &ConnectionHandle,
    ) -> String {
        let mut framer = LineFramer::new();
        let mut stream = response.bytes_stream();

        let first_line = async {
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                framer.push(&chunk);
                match framer.next_line() {
                    Ok(Some(line)) => return Some(line),
                    Ok(None) => {}
                    Err(_) => break,
                }
            }
            None
        };

        let line = tokio::select! {
            () = self.cancel.cancelled() => None,
            () = handle.closed() => None,
            () = tokio::time::sleep(DIAGNOSTIC_TIMEOUT) => None,
            line = first_line => line,
        };

        line.unwrap_or_else(|| "(no body)".to_string())
    }
}

/// Encode the form body: the filter field mapped to the joined terms.
fn form_body(joined_terms: &str) -> String {
    format!("{FILTER_PARAM}={}", signing::percent_encode(joined_terms))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::signing::{OauthSigner, SigningCredentials};

    #[test]
    fn default_config_values() {
        let config = FeedClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.recycle_interval, Duration::from_secs(120));
        assert_eq!(config.delivery_capacity, 1);
    }

    #[test]
    fn form_body_is_percent_encoded() {
        assert_eq!(form_body("rust,go"), "track=rust%2Cgo");
        assert_eq!(form_body("rust lang"), "track=rust%20lang");
        assert_eq!(form_body("caf\u{e9}"), "track=caf%C3%A9");
    }

    #[test]
    fn error_kinds_are_stable_labels() {
        assert_eq!(FeedError::Severed.kind(), "severed");
        assert_eq!(FeedError::StreamEnd.kind(), "stream_end");
        assert_eq!(FeedError::ChannelClosed.kind(), "channel_closed");
        assert_eq!(
            FeedError::Status {
                status: reqwest::StatusCode::IM_A_TEAPOT,
                diagnostic: String::new(),
            }
            .kind(),
            "status"
        );
    }

    #[tokio::test]
    async fn cancellation_closes_channel_despite_transport_errors() {
        // Connection-refused endpoint: the pump retries immediately and
        // indefinitely until cancelled.
        let config = FeedClientConfig {
            endpoint: "http://127.0.0.1:9/stream".to_string(),
            connect_timeout: Duration::from_millis(200),
            recycle_interval: Duration::from_secs(60),
            delivery_capacity: 1,
        };
        let credentials = SigningCredentials::new("ck", "cs", "at", "ts").unwrap();
        let client = FeedClient::new(config, Arc::new(OauthSigner::new(credentials))).unwrap();

        let cancel = CancellationToken::new();
        let mut receiver = client.run(cancel.clone(), ["x"].into_iter().collect());

        // Let it churn through a few failed attempts.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .expect("channel should close in bounded time after cancellation");
        assert!(closed.is_none(), "no records expected from a dead endpoint");
    }
}
