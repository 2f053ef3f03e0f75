//! Test configuration helpers

use opensearch_csv_export::Config;
use wiremock::MockServer;

/// Index every fake search service in these tests serves
pub const TEST_INDEX: &str = "logs";

/// Config pointing at a fake search service
///
/// Uses small pages and a tiny flush threshold so multi-page and multi-chunk
/// paths are exercised with a handful of documents.
pub fn config_for(server: &MockServer, page_size: usize) -> Config {
    let mut config = Config::default();
    config.opensearch.addresses = vec![server.uri()];
    config.opensearch.indices = vec![TEST_INDEX.to_string()];
    config.export.page_size = page_size;
    config.export.chunk_size = 16;
    config.export.channel_capacity = 2;
    config.api.swagger_ui = false;
    config
}
