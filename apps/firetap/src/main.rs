//! Firetap Binary
//!
//! Tails the filtered stream and logs each annotated record.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p firetap
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FIRETAP_CONSUMER_KEY`: OAuth consumer key
//! - `FIRETAP_CONSUMER_SECRET`: OAuth consumer secret
//! - `FIRETAP_ACCESS_TOKEN`: OAuth access token
//! - `FIRETAP_TOKEN_SECRET`: OAuth token secret
//! - `FIRETAP_TERMS`: Comma-separated watch terms
//!
//! ## Optional
//! - `FIRETAP_ENDPOINT`: Filter stream endpoint URL
//! - `FIRETAP_RECYCLE_INTERVAL_SECS`: Forced recycle interval (default: 120)
//! - `FIRETAP_CONNECT_TIMEOUT_SECS`: TCP connect timeout (default: 5)
//! - `FIRETAP_DELIVERY_CAPACITY`: Delivery channel capacity (default: 1)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use firetap::{FeedClient, FeedClientConfig, FeedConfig, OauthSigner, WatchTerms};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    firetap::init_telemetry();

    tracing::info!("Starting firetap");

    firetap::describe_metrics();

    let config = FeedConfig::from_env()?;
    let terms = watch_terms_from_env()?;
    log_config(&config, &terms);

    let signer = Arc::new(OauthSigner::new(config.credentials.clone()));
    let client = FeedClient::new(FeedClientConfig::from(&config), signer)?;

    let shutdown_token = CancellationToken::new();
    let mut records = client.run(shutdown_token.clone(), terms);

    // Consumer: log each annotated record until the channel closes.
    let consumer = tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            tracing::info!(
                matched = ?record.matched_terms,
                text = %record.text,
                "Record"
            );
        }
    });

    await_shutdown(shutdown_token).await;

    // The session ends on cancellation; wait for the channel to drain.
    consumer.await?;

    tracing::info!("Firetap stopped");
    Ok(())
}

/// Read the watch terms from `FIRETAP_TERMS` (comma-separated).
fn watch_terms_from_env() -> anyhow::Result<WatchTerms> {
    let raw = std::env::var("FIRETAP_TERMS")
        .map_err(|_| anyhow::anyhow!("FIRETAP_TERMS environment variable not set"))?;

    let terms: WatchTerms = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty() {
        anyhow::bail!("FIRETAP_TERMS must list at least one watch term");
    }
    Ok(terms)
}

/// Log the parsed configuration without secrets.
fn log_config(config: &FeedConfig, terms: &WatchTerms) {
    tracing::info!(
        endpoint = %config.endpoint,
        terms = terms.len(),
        recycle_interval_secs = config.stream.recycle_interval.as_secs(),
        connect_timeout_secs = config.stream.connect_timeout.as_secs(),
        delivery_capacity = config.stream.delivery_capacity,
        "Configuration loaded"
    );
}

/// Load .env from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
