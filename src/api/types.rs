//! Caller-facing payload types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::CritiqueResult;
use crate::ledger::QuotaSnapshot;

/// Default client-side action flags attached to every analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFlags {
    pub can_save: bool,
    pub can_delete: bool,
    pub is_current: bool,
}

impl Default for ActionFlags {
    fn default() -> Self {
        Self {
            can_save: true,
            can_delete: true,
            is_current: true,
        }
    }
}

/// Quota fields surfaced to the caller alongside the critique.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSummary {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
}

impl From<&QuotaSnapshot> for QuotaSummary {
    fn from(snapshot: &QuotaSnapshot) -> Self {
        Self {
            used: snapshot.used,
            limit: snapshot.limit,
            remaining: snapshot.remaining,
            reset_time: snapshot.reset_time.clone(),
        }
    }
}

/// The assembled response for one successful analysis: a fresh request
/// identifier, a UTC timestamp, action flags, the post-increment quota,
/// and the critique fields spread at top level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub actions: ActionFlags,
    pub quota: QuotaSummary,
    #[serde(flatten)]
    pub critique: CritiqueResult,
}

impl AnalysisResponse {
    pub fn assemble(critique: CritiqueResult, quota: &QuotaSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            actions: ActionFlags::default(),
            quota: quota.into(),
            critique,
        }
    }
}
