//! Request bodies for the initial search and for each continuation call

use std::time::Duration;

use serde_json::json;

use crate::error::Result;
use crate::types::ExportRequest;

/// Builds serialized request bodies for one export
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    timestamp_field: String,
    page_size: usize,
}

impl QueryBuilder {
    /// Create a builder filtering on `timestamp_field` and asking for `page_size` rows per page
    pub fn new(timestamp_field: impl Into<String>, page_size: usize) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            page_size,
        }
    }

    /// Body of the first search: page size, query-string clause, inclusive time range
    pub fn initial(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        let mut range = serde_json::Map::new();
        range.insert(
            self.timestamp_field.clone(),
            json!({
                "gte": request.from_date,
                "lte": request.to_date,
            }),
        );

        let body = json!({
            "size": self.page_size,
            "query": {
                "bool": {
                    "must": {
                        "query_string": { "query": request.query }
                    },
                    "filter": {
                        "range": range
                    }
                }
            }
        });
        Ok(serde_json::to_vec(&body)?)
    }

    /// Body of a continuation call carrying the cursor and the window extension
    pub fn continuation(&self, cursor: &str, window: Duration) -> Result<Vec<u8>> {
        let body = json!({
            "scroll": format_window(window),
            "scroll_id": cursor,
        });
        Ok(serde_json::to_vec(&body)?)
    }
}

/// Render a window duration in the search service's time-unit syntax
pub fn format_window(window: Duration) -> String {
    if window.subsec_millis() == 0 {
        format!("{}s", window.as_secs())
    } else {
        format!("{}ms", window.as_millis())
    }
}
