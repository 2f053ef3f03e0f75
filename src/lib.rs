//! # opensearch-csv-export
//!
//! Streams every document matching a query out of an OpenSearch (or
//! Elasticsearch) cluster as gzip-compressed, `;`-delimited text, without
//! holding the result set in memory.
//!
//! The library is split in two layers:
//! - [`export`] is the engine: query building, page fetching through the
//!   scroll API, incremental token-level decoding, column projection,
//!   record encoding and compression.
//! - [`api`] is the HTTP surface that forwards caller credentials and
//!   streams the engine's output back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use opensearch_csv_export::{Config, OpenSearchClient, api};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.opensearch.addresses = vec!["https://localhost:9200".to_string()];
//!     config.validate()?;
//!
//!     let client = OpenSearchClient::new(&config.opensearch)?;
//!     api::start_api_server(client, Arc::new(config)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Search service client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Scroll export engine
pub mod export;
/// Core types shared across modules
pub mod types;

pub use client::OpenSearchClient;
pub use config::Config;
pub use error::{Error, Result};
pub use export::{ExportStream, Exporter};
pub use types::{ExportRequest, ExportSummary};

use std::time::Duration;

/// Resolve once the process is asked to stop
///
/// Waits for SIGTERM or SIGINT (Ctrl+C elsewhere). When running under
/// Kubernetes it then waits `grace` more before returning, so endpoints and
/// ingresses stop routing new requests here before the listener closes.
pub async fn shutdown_signal(grace: Duration) {
    wait_for_signal().await;

    if running_in_kubernetes() && !grace.is_zero() {
        tracing::info!(
            grace_secs = grace.as_secs(),
            "Running in Kubernetes, waiting before shutdown"
        );
        tokio::time::sleep(grace).await;
    }
}

fn running_in_kubernetes() -> bool {
    std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
        && std::env::var_os("KUBERNETES_SERVICE_PORT").is_some()
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
