//! Error taxonomy for the analysis pipeline.
//!
//! Every failure a call can hit (local filesystem, usage ledger, inference
//! provider, output parsing) is one variant here, so the API layer can map
//! each to a single HTTP outcome. No variant is retried automatically.

use axum::http::StatusCode;
use thiserror::Error;

/// Pipeline-wide error type.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Credential header missing, malformed, or rejected by the ledger.
    #[error("missing or invalid bearer credential")]
    BadCredential,

    /// The ledger has no record of this caller.
    #[error("caller not known to the usage ledger")]
    UnknownCaller,

    /// Pre-check found no remaining quota; carries fields for client display.
    #[error("usage quota exhausted ({used}/{limit})")]
    QuotaExceeded {
        used: i64,
        limit: i64,
        reset_time: Option<String>,
    },

    /// Transport-level failure reaching the ledger service.
    #[error("usage ledger unreachable: {0}")]
    LedgerUnavailable(String),

    /// Ledger answered with an unexpected status.
    #[error("usage ledger returned status {status}: {body}")]
    LedgerError { status: u16, body: String },

    /// Local staging failed (unwritable directory, truncated stream).
    #[error("media staging failed: {0}")]
    IoFault(String),

    /// Upload to the inference provider was rejected or never completed.
    #[error("media upload to inference provider failed: {0}")]
    UploadFailed(String),

    /// The provider reported the uploaded media as failed, or its state
    /// could not be read.
    #[error("remote media processing failed: {0}")]
    RemoteProcessingFailed(String),

    /// The structured-generation request failed or returned nothing.
    #[error("inference request failed: {0}")]
    InferenceRequestFailed(String),

    /// The provider's text response did not decode into a critique.
    #[error("inference output was not a valid critique")]
    MalformedOutput { raw: String },
}

impl AnalysisError {
    /// HTTP status this failure surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadCredential => StatusCode::UNAUTHORIZED,
            Self::UnknownCaller => StatusCode::NOT_FOUND,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
