//! Credential forwarding for the REST API
//!
//! The exporter holds no credentials of its own. Every export request must
//! carry an `Authorization: Basic ...` header, which is passed through to
//! the search service unchanged so the cluster enforces its own access rules.

use axum::http::{HeaderMap, header::AUTHORIZATION};

use crate::error::{Error, Result};

const WRONG_FORMAT: &str = "wrong format on Authorization header";

/// Extract the Basic credentials to forward from the request headers
///
/// # Errors
///
/// Returns [`Error::Credentials`] if the header is missing, is not ASCII, uses
/// a scheme other than Basic, or carries no credentials.
pub fn forwarded_authorization(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Credentials("missing Authorization header".to_string()))?;
    let text = value
        .to_str()
        .map_err(|_| Error::Credentials(WRONG_FORMAT.to_string()))?;

    match text.split_once(' ') {
        Some((scheme, credentials))
            if scheme.eq_ignore_ascii_case("basic") && !credentials.trim().is_empty() =>
        {
            Ok(text)
        }
        _ => Err(Error::Credentials(WRONG_FORMAT.to_string())),
    }
}
