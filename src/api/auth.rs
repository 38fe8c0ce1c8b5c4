//! Bearer-credential extraction from inbound headers.
//!
//! Tokens are opaque here; the usage ledger is the verifier of record.
//! Extraction runs before the pipeline is entered, so a malformed header
//! fails the call before any network traffic.

use axum::http::{header, HeaderMap};

use crate::error::{AnalysisError, Result};

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AnalysisError::BadCredential)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AnalysisError::BadCredential)?;

    if token.is_empty() {
        return Err(AnalysisError::BadCredential);
    }
    Ok(token)
}
