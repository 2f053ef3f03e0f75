//! Export handler.

use super::TOTAL_HITS_HEADER;
use crate::api::AppState;
use crate::api::auth::forwarded_authorization;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::types::ExportRequest;
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{CONTENT_ENCODING, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;

/// POST /api/opensearch/csv-export-v1 - Export matching documents as gzip-compressed CSV
///
/// The caller's Basic credentials are forwarded to the search service. The
/// response is only committed once the first page has been fetched; errors
/// after that are logged and the archive is closed early.
#[utoipa::path(
    post,
    path = "/api/opensearch/csv-export-v1",
    tag = "export",
    request_body = ExportRequest,
    params(
        ("Authorization" = String, Header, description = "Basic credentials forwarded to the search service")
    ),
    responses(
        (status = 200, description = "Gzip-compressed, `;`-delimited rows (header first)", content_type = "application/csv"),
        (status = 400, description = "Missing credentials or invalid request", body = crate::error::ApiError),
        (status = 502, description = "Search service failed or returned an unreadable page", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response> {
    let authorization = forwarded_authorization(&headers)?;
    let Json(request) = payload.map_err(|e| Error::InvalidRequest(e.body_text()))?;

    let client = state.client.with_authorization(authorization)?;
    tracing::info!(
        columns = request.columns.len(),
        from = %request.from_date,
        to = %request.to_date,
        "export requested"
    );

    let exporter = Exporter::new(Arc::new(client), state.config.export.clone());
    let stream = exporter.start(request).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/csv"));
    response_headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    if let Some(total) = stream.total() {
        response_headers.insert(
            HeaderName::from_static(TOTAL_HITS_HEADER),
            HeaderValue::from(total),
        );
    }

    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    Ok((StatusCode::OK, response_headers, body).into_response())
}
