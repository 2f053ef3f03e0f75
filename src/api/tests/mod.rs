use super::*;
use crate::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::oneshot;
use std::io::Read;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::MockServer;


const FIXTURE_PAGE: &str = include_str!("../../../tests/fixtures/scroll_page.json");
const CREDENTIALS: &str = "Basic dXNlcjpwYXNz";

/// Config pointing at `server`, with pages exactly as large as the fixture page
fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.opensearch.addresses = vec![server.uri()];
    config.opensearch.indices = vec!["logs".to_string()];
    config.export.page_size = 3;
    config.export.chunk_size = 64;
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

fn router_for(config: Config) -> Router {
    let client = OpenSearchClient::new(&config.opensearch).unwrap();
    create_router(client, Arc::new(config))
}

fn gunzip(bytes: &[u8]) -> String {
    let mut text = String::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .unwrap();
    text
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let client = OpenSearchClient::new(&config.opensearch).unwrap();

    let api_handle = tokio::spawn(start_api_server(client, Arc::new(config)));

    // Give it a moment to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");

    api_handle.abort();
}

#[tokio::test]
async fn test_api_server_reports_bind_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.api.bind_address = taken.local_addr().unwrap();
    let client = OpenSearchClient::new(&config.opensearch).unwrap();

    let result = start_api_server(client, Arc::new(config)).await;
    assert!(matches!(result, Err(crate::Error::Io(_))));
}

#[tokio::test]
async fn test_cors_enabled() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = router_for(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["http://grafana.internal".to_string()];
    let app = router_for(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://grafana.internal")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://grafana.internal"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let server = MockServer::start().await;
    let app = router_for(test_config(&server));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_exposes_export_headers() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["http://grafana.internal".to_string(), "bad\norigin".to_string()];
    let app = router_for(config);

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/opensearch/csv-export-v1")
        .header("Origin", "http://grafana.internal")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(preflight).await.unwrap();
    let allowed = response.headers()["access-control-allow-methods"].to_str().unwrap();
    assert!(allowed.contains("POST"), "{allowed}");
    let headers = response.headers()["access-control-allow-headers"].to_str().unwrap();
    assert!(headers.contains("authorization"), "{headers}");

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://grafana.internal")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let exposed = response.headers()["access-control-expose-headers"].to_str().unwrap();
    assert!(exposed.contains("total-hits"), "{exposed}");
    assert!(exposed.contains("content-encoding"), "{exposed}");
}

async fn hanging_stream() -> Body {
    Body::from_stream(futures::stream::pending::<
        std::result::Result<bytes::Bytes, std::convert::Infallible>,
    >())
}

#[tokio::test]
async fn test_shutdown_deadline_closes_hanging_streams() {
    let app = Router::new().route("/stream", axum::routing::get(hanging_stream));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let deadline = Duration::from_millis(200);
    let server = tokio::spawn(serve_until(
        listener,
        app,
        async move {
            let _ = stopped.await;
        },
        deadline,
    ));

    let response = reqwest::get(format!("http://{addr}/stream")).await.unwrap();
    assert_eq!(response.status(), 200);

    let started = std::time::Instant::now();
    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("shutdown must not wait for the open stream")
        .unwrap();

    assert!(result.is_ok());
    assert!(started.elapsed() >= deadline);
    drop(response);
}

#[tokio::test]
async fn test_idle_server_stops_before_deadline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let deadline = Duration::from_secs(30);

    let started = std::time::Instant::now();
    serve_until(listener, Router::new(), async {}, deadline)
        .await
        .unwrap();

    assert!(started.elapsed() < deadline);
}
