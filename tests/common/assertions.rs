//! Output assertions for export integration tests

use std::io::Read;

use serde_json::Value;
use wiremock::MockServer;

/// Decompress a complete gzip archive, panicking if it is not one
pub fn gunzip(bytes: &[u8]) -> String {
    let mut text = String::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .expect("output should be a complete gzip archive");
    text
}

/// Assert the archive holds `header` followed by exactly `records`, each line-terminated
pub fn assert_records(text: &str, header: &str, records: &[String]) {
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(header), "header must come first");
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), records.len(), "row count");
    for (i, (got, want)) in rows.iter().zip(records).enumerate() {
        assert_eq!(got, want, "row {i}");
    }
    assert!(text.ends_with('\n'), "records end with a newline");
}

/// Cursors the fake service was asked to release, in order
pub async fn released_cursors(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .filter_map(|body| body["scroll_id"][0].as_str().map(str::to_string))
        .collect()
}
