//! Core types shared between the export engine and the API layer

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// A request to export every document matching a query in a time range
///
/// Field names follow the JSON body accepted by the export endpoint.
/// Both camelCase and PascalCase spellings are accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportRequest {
    /// Inclusive lower bound of the timestamp range
    #[serde(rename = "fromDate", alias = "FromDate", alias = "fromdate", default)]
    pub from_date: String,

    /// Inclusive upper bound of the timestamp range
    #[serde(rename = "toDate", alias = "ToDate", alias = "todate", default)]
    pub to_date: String,

    /// Free-text query in the search service's query-string syntax
    #[serde(alias = "Query", default)]
    pub query: String,

    /// Dotted field paths to project, in output order
    #[serde(alias = "Columns", default)]
    pub columns: Vec<String>,
}

impl ExportRequest {
    /// Reject requests that would be pointless to send upstream
    pub fn validate(&self) -> Result<()> {
        if self.query.is_empty() {
            return Err(Error::InvalidRequest("missing query".to_string()));
        }
        if self.from_date.is_empty() {
            return Err(Error::InvalidRequest("missing fromDate".to_string()));
        }
        if self.to_date.is_empty() {
            return Err(Error::InvalidRequest("missing toDate".to_string()));
        }
        Ok(())
    }
}

/// Counters reported when an export ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Number of pages fetched and decoded
    pub pages: usize,
    /// Number of rows written after the header
    pub rows: u64,
    /// Total match count reported by the search service
    pub total: Option<u64>,
}
