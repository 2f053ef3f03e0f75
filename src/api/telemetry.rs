//! Request logging and Prometheus metrics for the HTTP surface
//!
//! Every matched route is counted in `http_requests_total` and timed in
//! `http_request_duration_seconds`, labelled by method, route and status.
//! Health checks and scrapes (`/health`, `/metrics`) are measured but not logged.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Span;

/// Routes excluded from request logging
pub const UNLOGGED_PATHS: [&str; 2] = ["/health", "/metrics"];

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle to the process-wide Prometheus recorder, installed on first use
pub fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("another metrics recorder is installed; /metrics will not see it");
            }
            handle
        })
        .clone()
}

/// Middleware recording request count and latency per matched route
pub async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => route,
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());

    response
}

/// Span for one request, or a disabled span for unlogged routes
pub fn request_span(request: &Request) -> Span {
    if UNLOGGED_PATHS.contains(&request.uri().path()) {
        return Span::none();
    }
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// Log the response status once headers are ready
///
/// Streaming exports keep sending after this point; the export itself logs
/// when it finishes.
pub fn log_response(response: &Response, latency: Duration, span: &Span) {
    if span.is_none() {
        return;
    }
    tracing::info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "response started"
    );
}
