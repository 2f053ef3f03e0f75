//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the export REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the export REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "opensearch-csv-export REST API",
        version = "0.1.0",
        description = "Streams documents matching a query string and time range out of OpenSearch as gzip-compressed CSV",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Export
        crate::api::routes::export_csv,

        // System
        crate::api::routes::health_check,
        crate::api::routes::metrics,
        crate::api::routes::openapi_spec,
    ),
    components(
        schemas(
            crate::types::ExportRequest,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "export", description = "Streaming CSV export"),
        (name = "system", description = "System information and health checks")
    )
)]
pub struct ApiDoc;
