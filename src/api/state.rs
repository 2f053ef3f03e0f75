//! Application state for the API server

use crate::{Config, OpenSearchClient};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Client for the search cluster, without caller credentials attached
    pub client: OpenSearchClient,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// Renders the process-wide Prometheus registry
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Create a new AppState
    pub fn new(client: OpenSearchClient, config: Arc<Config>) -> Self {
        Self {
            client,
            config,
            metrics: super::telemetry::prometheus_handle(),
        }
    }
}
