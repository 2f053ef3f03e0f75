//! Error types for opensearch-csv-export
//!
//! This module provides error handling for the exporter, including:
//! - The export failure taxonomy (invalid request, transport, remote, decode, encode)
//! - HTTP status code mapping for the API layer
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for opensearch-csv-export
///
/// Every failure during an export is fatal to that export. Nothing here is
/// retried internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The export request is incomplete (detected before any network call)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller did not supply usable credentials to forward
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// The search service could not be reached or the connection broke
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The search service answered but flagged the request as failed
    #[error("search service returned {status}: {message}")]
    Remote {
        /// HTTP status reported by the search service
        status: u16,
        /// Error text taken from the service's own response
        message: String,
    },

    /// A response body was malformed or ended early
    #[error("decode error in {context}: {source}")]
    Decode {
        /// Where the failure happened (e.g. "page 3")
        context: String,
        /// The underlying syntax failure
        #[source]
        source: SyntaxError,
    },

    /// Writing encoded output failed (e.g. consumer disconnected)
    #[error("encode error: {0}")]
    Encode(#[source] std::io::Error),

    /// The export was cancelled before it could finish
    #[error("export cancelled")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "opensearch.addresses")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// A malformed or truncated JSON token stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The input ended in the middle of a value
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof {
        /// Absolute byte offset where input ran out
        offset: u64,
    },

    /// A byte that cannot appear at this position
    #[error("unexpected {found:?} at byte {offset}, expected {expected}")]
    Unexpected {
        /// Absolute byte offset of the offending byte
        offset: u64,
        /// The offending byte, rendered as a char
        found: char,
        /// What the lexer was looking for
        expected: &'static str,
    },

    /// A structurally valid token with invalid contents
    #[error("invalid {what} at byte {offset}")]
    Invalid {
        /// Absolute byte offset where the token starts
        offset: u64,
        /// Which kind of token was invalid (string escape, number, ...)
        what: &'static str,
    },

    /// A well-formed token that does not fit the expected response shape
    #[error("unexpected {found} for {field}")]
    Shape {
        /// The field being decoded
        field: &'static str,
        /// Description of what was found instead
        found: String,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs before
/// any export output has been produced.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "remote_error",
///     "message": "search service returned 404: no such index [logs-x]",
///     "details": {
///       "upstream_status": 404
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_request", "remote_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps export errors to appropriate HTTP status codes.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - caller supplied something unusable
            Error::InvalidRequest(_) => 400,
            Error::Credentials(_) => 400,

            // 499 Client Closed Request
            Error::Cancelled => 499,

            // 502 Bad Gateway - the search service failed us
            Error::Transport(_) => 502,
            Error::Remote { .. } => 502,
            Error::Decode { .. } => 502,

            // 500 Internal Server Error - our side
            Error::Encode(_) => 500,
            Error::Config { .. } => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::Credentials(_) => "invalid_credentials",
            Error::Transport(_) => "transport_error",
            Error::Remote { .. } => "remote_error",
            Error::Decode { .. } => "decode_error",
            Error::Encode(_) => "encode_error",
            Error::Cancelled => "cancelled",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let mut api_error = ApiError::new(error.error_code(), error.to_string());
        api_error.error.details = match &error {
            Error::Remote { status, .. } => Some(serde_json::json!({
                "upstream_status": status,
            })),
            Error::Decode { context, .. } => Some(serde_json::json!({
                "context": context,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };
        api_error
    }
}
