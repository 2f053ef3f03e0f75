//! Scroll page builders and fake search service wiring

use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::TEST_INDEX;

/// `user:pass` as Basic credentials
pub const CREDENTIALS: &str = "Basic dXNlcjpwYXNz";

/// A log document with a predictable timestamp and message
pub fn document(n: usize) -> Value {
    json!({
        "@timestamp": format!("2024-04-03T06:{:02}:{:02}.000Z", n / 60, n % 60),
        "message": format!("cool log number {n}"),
        "type": "cool type",
        "container": { "image": { "name": format!("cool image name {n}") } }
    })
}

/// The record `document(n)` turns into with columns `type` and `container.image.name`
pub fn expected_record(n: usize) -> String {
    format!(
        "2024-04-03T06:{:02}:{:02}.000Z;cool log number {n};cool type;cool image name {n}",
        n / 60,
        n % 60
    )
}

/// A scroll response in the service's field order (total before hits)
pub fn scroll_page(cursor: &str, total: usize, docs: &[Value]) -> String {
    let hits: Vec<String> = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(r#"{{"_index":"{TEST_INDEX}","_id":"id-{i}","_score":1.0,"_source":{doc}}}"#)
        })
        .collect();
    format!(
        r#"{{"_scroll_id":"{cursor}","took":2,"timed_out":false,"hits":{{"total":{{"value":{total},"relation":"eq"}},"max_score":1.0,"hits":[{}]}}}}"#,
        hits.join(",")
    )
}

/// Standard export request body for the given query
pub fn export_body(query: &str, columns: &[&str]) -> Value {
    json!({
        "fromDate": "2024-04-03T00:00:00Z",
        "toDate": "2024-04-04T00:00:00Z",
        "query": query,
        "columns": columns,
    })
}

/// Serve `total` documents in pages of `page_size`
///
/// Page `k` carries cursor `c{k}`; a continuation with cursor `c{k}` returns
/// page `k + 1`. Releasing any window succeeds. Returns the last cursor.
pub async fn mount_documents(server: &MockServer, total: usize, page_size: usize) -> String {
    let docs: Vec<Value> = (0..total).map(document).collect();
    let mut pages: Vec<&[Value]> = docs.chunks(page_size).collect();
    // An exactly full last page is followed by one empty page
    if total % page_size == 0 {
        pages.push(&[]);
    }

    for (k, page) in pages.iter().enumerate() {
        let cursor = format!("c{}", k + 1);
        let response = ResponseTemplate::new(200).set_body_string(scroll_page(&cursor, total, page));
        if k == 0 {
            Mock::given(method("POST"))
                .and(path(format!("/{TEST_INDEX}/_search")))
                .and(query_param("scroll", "60s"))
                .respond_with(response)
                .expect(1)
                .mount(server)
                .await;
        } else {
            mount_continuation(server, &format!("c{k}"), response).await;
        }
    }

    mount_release(server).await;
    format!("c{}", pages.len())
}

/// Answer the continuation carrying `cursor` with `response`
pub async fn mount_continuation(server: &MockServer, cursor: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll": "60s", "scroll_id": cursor })))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

/// Accept any window release
pub async fn mount_release(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"succeeded":true}"#))
        .mount(server)
        .await;
}
