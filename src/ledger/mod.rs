//! Client for the usage ledger service.
//!
//! The ledger is the service of record for per-caller quota state. This
//! client wraps its three endpoints (check, increment, status) behind a
//! trait so the pipeline can be driven against scripted fakes in tests.
//! One outbound call per operation, bounded timeout, no retries; retry
//! policy belongs to the pipeline, which currently performs none.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::error::{AnalysisError, Result};

/// Point-in-time quota state for one caller.
///
/// `limit`/`remaining` of -1 mean unlimited (paid callers). Increment
/// responses omit `allowed` and `resetTime`; both default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    #[serde(default)]
    pub allowed: bool,
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paid: Option<bool>,
}

/// Trait for quota ledger clients.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Ask whether the caller may run another analysis.
    async fn check_quota(&self, token: &str) -> Result<QuotaSnapshot>;

    /// Charge one analysis to the caller. Called only after success.
    async fn increment_quota(&self, token: &str) -> Result<QuotaSnapshot>;

    /// Fetch the caller's current quota state without charging.
    async fn quota_status(&self, token: &str) -> Result<QuotaSnapshot>;
}

/// Which ledger endpoint a response came from; drives error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerOp {
    Check,
    Increment,
    Status,
}

/// HTTP implementation against the ledger REST API.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, op: LedgerOp, token: &str) -> Result<QuotaSnapshot> {
        let (method, path) = match op {
            LedgerOp::Check => (reqwest::Method::POST, "/api/quota/check"),
            LedgerOp::Increment => (reqwest::Method::POST, "/api/quota/increment"),
            LedgerOp::Status => (reqwest::Method::GET, "/api/quota/status"),
        };

        let response = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AnalysisError::LedgerUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::LedgerUnavailable(e.to_string()))?;

        map_response(op, status, &body)
    }
}

#[async_trait]
impl QuotaLedger for HttpLedgerClient {
    async fn check_quota(&self, token: &str) -> Result<QuotaSnapshot> {
        self.call(LedgerOp::Check, token).await
    }

    async fn increment_quota(&self, token: &str) -> Result<QuotaSnapshot> {
        self.call(LedgerOp::Increment, token).await
    }

    async fn quota_status(&self, token: &str) -> Result<QuotaSnapshot> {
        self.call(LedgerOp::Status, token).await
    }
}

/// Translate a ledger HTTP outcome into the pipeline taxonomy.
fn map_response(op: LedgerOp, status: u16, body: &str) -> Result<QuotaSnapshot> {
    match status {
        200..=299 => serde_json::from_str(body).map_err(|e| AnalysisError::LedgerError {
            status,
            body: format!("undecodable snapshot: {} ({})", e, body),
        }),
        401 => Err(AnalysisError::BadCredential),
        404 if matches!(op, LedgerOp::Check | LedgerOp::Status) => {
            Err(AnalysisError::UnknownCaller)
        }
        _ => Err(AnalysisError::LedgerError {
            status,
            body: body.to_string(),
        }),
    }
}
