//! HTTP client for the search service's scroll API
//!
//! [`OpenSearchClient`] implements [`SearchEndpoint`] over reqwest. Response
//! bodies are handed back as byte streams; nothing is buffered beyond what
//! reqwest itself holds. Requests rotate over the configured nodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::config::OpenSearchConfig;
use crate::error::{Error, Result};
use crate::export::fetch::{PageStream, SearchEndpoint};
use crate::export::query::format_window;

/// Longest slice of a non-JSON error body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

/// Client for one search cluster
///
/// Cheap to clone; clones share the connection pool and node rotation.
#[derive(Clone, Debug)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    nodes: Arc<[Url]>,
    next_node: Arc<AtomicUsize>,
    indices: Vec<String>,
    authorization: Option<HeaderValue>,
}

impl OpenSearchClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns a configuration error if no address is given, an address does
    /// not parse, or the CA certificate cannot be read.
    pub fn new(config: &OpenSearchConfig) -> Result<Self> {
        if config.addresses.is_empty() {
            return Err(Error::config(
                "opensearch.addresses",
                "missing opensearch addresses",
            ));
        }
        let nodes = config
            .addresses
            .iter()
            .map(|address| base_url(address))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("opensearch-csv-export/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                Error::config(
                    "opensearch.ca_cert_path",
                    format!("failed to read {}: {}", path.display(), e),
                )
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::config(
                    "opensearch.ca_cert_path",
                    format!("invalid certificate {}: {}", path.display(), e),
                )
            })?;
            builder = builder.add_root_certificate(certificate);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            nodes: nodes.into(),
            next_node: Arc::new(AtomicUsize::new(0)),
            indices: config.indices.clone(),
            authorization: None,
        })
    }

    /// A client that sends `value` as the Authorization header on every call
    pub fn with_authorization(&self, value: &str) -> Result<Self> {
        let mut header = HeaderValue::from_str(value).map_err(|_| {
            Error::Credentials("Authorization header is not a valid header value".to_string())
        })?;
        header.set_sensitive(true);
        Ok(Self {
            authorization: Some(header),
            ..self.clone()
        })
    }

    fn node(&self) -> &Url {
        let i = self.next_node.fetch_add(1, Ordering::Relaxed);
        &self.nodes[i % self.nodes.len()]
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.node().join(path).map_err(|e| {
            Error::config(
                "opensearch.addresses",
                format!("cannot build request URL for {path}: {e}"),
            )
        })
    }

    fn search_path(&self) -> String {
        if self.indices.is_empty() {
            "_search".to_string()
        } else {
            format!("{}/_search", self.indices.join(","))
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value.clone()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(remote_error(response).await)
        }
    }
}

#[async_trait]
impl SearchEndpoint for OpenSearchClient {
    async fn search(&self, body: Vec<u8>, window: Duration) -> Result<PageStream> {
        let mut url = self.url(&self.search_path())?;
        url.query_pairs_mut()
            .append_pair("scroll", &format_window(window));

        tracing::debug!(url = %url, "opening scroll");
        let response = self.send(self.request(Method::POST, url).body(body)).await?;
        Ok(body_stream(response))
    }

    async fn continue_scroll(&self, body: Vec<u8>, _window: Duration) -> Result<PageStream> {
        let url = self.url("_search/scroll")?;
        let response = self.send(self.request(Method::POST, url).body(body)).await?;
        Ok(body_stream(response))
    }

    async fn release(&self, cursor: &str) -> Result<()> {
        let url = self.url("_search/scroll")?;
        let body = serde_json::to_vec(&serde_json::json!({ "scroll_id": [cursor] }))?;
        self.send(self.request(Method::DELETE, url).body(body))
            .await
            .map(|_| ())
    }
}

/// Parse an address and make sure relative joins land under its path
fn base_url(address: &str) -> Result<Url> {
    let mut url = Url::parse(address).map_err(|e| {
        Error::config(
            "opensearch.addresses",
            format!("invalid address {address:?}: {e}"),
        )
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn body_stream(response: Response) -> PageStream {
    response.bytes_stream().map_err(Error::Transport).boxed()
}

/// Turn an error response into [`Error::Remote`], preferring the service's own reason
async fn remote_error(response: Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = error_reason(&text).unwrap_or_else(|| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            truncate(trimmed, MAX_ERROR_BODY)
        }
    });

    tracing::debug!(status = status.as_u16(), %message, "search service returned an error");
    Error::Remote {
        status: status.as_u16(),
        message,
    }
}

/// `{"error": {"reason": ...}}`, `{"error": {"type": ...}}` or `{"error": "..."}`
fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }
    error
        .get("reason")
        .or_else(|| error.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(addresses: Vec<String>, indices: &[&str]) -> OpenSearchConfig {
        OpenSearchConfig {
            addresses,
            indices: indices.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn read(stream: PageStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn search_posts_to_indices_with_scroll_and_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs-a,logs-b/_search"))
            .and(query_param("scroll", "60s"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"size": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"hits":{}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenSearchClient::new(&config(vec![server.uri()], &["logs-a", "logs-b"]))
            .unwrap()
            .with_authorization("Basic dXNlcjpwYXNz")
            .unwrap();
        let stream = client
            .search(br#"{"size":3}"#.to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(read(stream).await, br#"{"hits":{}}"#);
    }

    #[tokio::test]
    async fn search_without_indices_targets_all() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenSearchClient::new(&config(vec![server.uri()], &[])).unwrap();
        let stream = client.search(b"{}".to_vec(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(read(stream).await, b"{}");
    }

    #[tokio::test]
    async fn address_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search-proxy/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let address = format!("{}/search-proxy", server.uri());
        let client = OpenSearchClient::new(&config(vec![address], &["logs"])).unwrap();
        let stream = client
            .continue_scroll(br#"{"scroll_id":"c1"}"#.to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(read(stream).await, b"{}");
    }

    #[tokio::test]
    async fn continue_scroll_posts_cursor_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll": "60s", "scroll_id": "c1"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"_scroll_id":"c2"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenSearchClient::new(&config(vec![server.uri()], &["logs"])).unwrap();
        let stream = client
            .continue_scroll(
                br#"{"scroll":"60s","scroll_id":"c1"}"#.to_vec(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(read(stream).await, br#"{"_scroll_id":"c2"}"#);
    }

    #[tokio::test]
    async fn release_deletes_scroll() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll_id": ["c1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"succeeded":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenSearchClient::new(&config(vec![server.uri()], &[])).unwrap();
        client.release("c1").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_uses_service_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "type": "index_not_found_exception",
                    "reason": "no such index [logs-x]"
                },
                "status": 404
            })))
            .mount(&server)
            .await;

        let client = OpenSearchClient::new(&config(vec![server.uri()], &["logs-x"])).unwrap();
        let err = client
            .search(b"{}".to_vec(), Duration::from_secs(60))
            .await
            .err()
            .unwrap();
        match err {
            Error::Remote { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such index [logs-x]");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_falls_back_to_type_then_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/typed/_search"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": {"type": "parsing_exception"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/plain/_search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/empty/_search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        for (index, status, expected) in [
            ("typed", 400, "parsing_exception"),
            ("plain", 401, "Unauthorized"),
            ("empty", 503, "Service Unavailable"),
        ] {
            let client = OpenSearchClient::new(&config(vec![server.uri()], &[index])).unwrap();
            let err = client
                .search(b"{}".to_vec(), Duration::from_secs(1))
                .await
                .err()
                .unwrap();
            assert!(
                matches!(err, Error::Remote { status: s, ref message } if s == status && message == expected),
                "{index}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn requests_rotate_across_nodes() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        for (server, node) in [(&first, "first"), (&second, "second")] {
            Mock::given(method("POST"))
                .and(path("/_search/scroll"))
                .respond_with(ResponseTemplate::new(200).set_body_string(node))
                .expect(1)
                .mount(server)
                .await;
        }

        let client =
            OpenSearchClient::new(&config(vec![first.uri(), second.uri()], &[])).unwrap();
        let mut answered = Vec::new();
        for _ in 0..2 {
            let stream = client
                .continue_scroll(b"{}".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();
            answered.push(String::from_utf8(read(stream).await).unwrap());
        }
        answered.sort();
        assert_eq!(answered, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn unreachable_node_is_transport_error() {
        let client =
            OpenSearchClient::new(&config(vec!["http://127.0.0.1:1".to_string()], &[])).unwrap();
        let err = client
            .search(b"{}".to_vec(), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Transport(_)), "{err:?}");
    }

    #[test]
    fn construction_rejects_bad_configuration() {
        assert!(matches!(
            OpenSearchClient::new(&config(vec![], &[])),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            OpenSearchClient::new(&config(vec!["::nope".to_string()], &[])),
            Err(Error::Config { .. })
        ));

        let mut bad_ca = config(vec!["https://localhost:9200".to_string()], &[]);
        bad_ca.ca_cert_path = Some("/definitely/missing/ca.pem".into());
        match OpenSearchClient::new(&bad_ca) {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("opensearch.ca_cert_path"))
            }
            other => panic!("expected config error, got {:?}", other.err()),
        }
    }

    #[test]
    fn garbage_certificate_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"not a certificate").unwrap();

        let mut cfg = config(vec!["https://localhost:9200".to_string()], &[]);
        cfg.ca_cert_path = Some(file.path().to_path_buf());
        assert!(matches!(
            OpenSearchClient::new(&cfg),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn credentials_must_be_valid_header_values() {
        let client =
            OpenSearchClient::new(&config(vec!["http://localhost:9200".to_string()], &[])).unwrap();
        assert!(matches!(
            client.with_authorization("Basic bad\nvalue"),
            Err(Error::Credentials(_))
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let long = "x".repeat(2000);
        let cut = truncate(&long, MAX_ERROR_BODY);
        assert_eq!(cut.len(), MAX_ERROR_BODY + 3);
        assert_eq!(truncate("short", 10), "short");
    }
}
