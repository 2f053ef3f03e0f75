//! REST API server module
//!
//! Exposes the export engine over HTTP: one streaming export endpoint, plus
//! health and OpenAPI routes.

use crate::{Config, OpenSearchClient, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Export
/// - `POST /api/opensearch/csv-export-v1` - Stream matching documents as gzip-compressed CSV
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /metrics` - Prometheus metrics
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(client: OpenSearchClient, config: Arc<Config>) -> Router {
    let state = AppState::new(client, config.clone());

    let router = Router::new()
        // Export
        .route("/api/opensearch/csv-export-v1", post(routes::export_csv))
        // System
        .route("/health", get(routes::health_check))
        .route("/metrics", get(routes::metrics))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes if enabled in config (before applying state).
    // SwaggerUi serves its own copy of the document, so it needs a path that
    // does not collide with /openapi.json above.
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .route_layer(middleware::from_fn(telemetry::track_requests))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(telemetry::request_span)
                .on_request(())
                .on_response(telemetry::log_response),
        );

    // Apply CORS middleware if enabled in config
    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// CORS for browser callers of the export route
///
/// An empty list or `"*"` admits any origin. Browsers may only read
/// `total-hits` and `content-encoding` if they are exposed explicitly.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| tracing::warn!(%origin, "ignoring invalid CORS origin"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(routes::TOTAL_HITS_HEADER),
            header::CONTENT_ENCODING,
        ])
}

/// Start the API server on the configured bind address.
///
/// Runs until SIGTERM/SIGINT is received (see [`crate::shutdown_signal`]),
/// then stops accepting connections and gives in-flight exports
/// `api.shutdown_timeout` to finish before returning.
///
/// # Example
///
/// ```no_run
/// use opensearch_csv_export::{Config, OpenSearchClient};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = Config::default();
/// config.opensearch.addresses = vec!["http://localhost:9200".to_string()];
/// let client = OpenSearchClient::new(&config.opensearch)?;
///
/// // Start API server (blocks until shutdown)
/// opensearch_csv_export::api::start_api_server(client, Arc::new(config)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(client: OpenSearchClient, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;
    let grace = config.api.shutdown_grace;
    let deadline = config.api.shutdown_timeout;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(client, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    serve_until(listener, app, crate::shutdown_signal(grace), deadline).await?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Serve `app` until `shutdown` resolves, then drain for at most `deadline`
///
/// Connections still open when the deadline passes are abandoned; their
/// exports are cancelled once the runtime drops them.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    deadline: Duration,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let stopping = CancellationToken::new();
    let trigger = stopping.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            trigger.cancel();
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(server_error),
        () = stopping.cancelled() => {}
    }

    tracing::info!(timeout = ?deadline, "draining open connections");
    match tokio::time::timeout(deadline, server).await {
        Ok(result) => result.map_err(server_error),
        Err(_) => {
            tracing::warn!(timeout = ?deadline, "connections still open at shutdown deadline, closing");
            Ok(())
        }
    }
}

fn server_error(e: std::io::Error) -> crate::error::Error {
    crate::error::Error::ApiServerError(e.to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
