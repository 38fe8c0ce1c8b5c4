//! Inference session - drives one remote analysis end to end.
//!
//! Protocol, strictly ordered: upload the staged artifact, poll the remote
//! job until it is active (or the provider reports failure, or the deadline
//! elapses), issue the structured-critique request, and delete the remote
//! resource afterward whatever the outcome. Remote deletion is advisory:
//! a failure there is logged and never fails the analysis.

mod parse;

pub use parse::parse_critique;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{AnalysisError, Result};
use crate::provider::{GenerationOptions, InferenceProvider, JobState, RemoteJob};
use crate::staging::StagedArtifact;

/// Overall assessment bucket of a critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CritiqueStatus {
    Good,
    Warning,
    Critical,
}

/// The validated structured output of one analysis.
///
/// Every field tolerates absence; the score is kept as a raw JSON number so
/// it reaches the caller exactly as the model produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CritiqueStatus>,
    #[serde(default)]
    pub positives: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default, rename = "aiCoachTip", skip_serializing_if = "Option::is_none")]
    pub coach_tip: Option<String>,
}

const CRITIQUE_PROMPT: &str = r#"Analyze this gym workout video for exercise form.
Return ONLY valid JSON:
{
  "exercise": "{exercise}",
  "score": 82,
  "verdict": "Great Form!",
  "status": "good",
  "positives": ["list"],
  "improvements": ["list"],
  "aiCoachTip": "string"
}"#;

const DEFAULT_EXERCISE_LABEL: &str = "Detected Exercise";

fn build_prompt(exercise: Option<&str>) -> String {
    CRITIQUE_PROMPT.replace("{exercise}", exercise.unwrap_or(DEFAULT_EXERCISE_LABEL))
}

/// Drives one remote analysis against the inference provider.
pub struct InferenceSession {
    provider: Arc<dyn InferenceProvider>,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl InferenceSession {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        poll_interval: Duration,
        poll_deadline: Duration,
    ) -> Self {
        Self {
            provider,
            poll_interval,
            poll_deadline,
        }
    }

    /// Run the full upload / poll / infer / cleanup protocol.
    pub async fn analyze(
        &self,
        artifact: &StagedArtifact,
        exercise: Option<&str>,
    ) -> Result<CritiqueResult> {
        let job = self
            .provider
            .upload_media(artifact.path(), artifact.mime_type())
            .await?;

        let outcome = self
            .critique_uploaded(job.clone(), artifact.mime_type(), exercise)
            .await;

        // Cleanup is attempted exactly once per created job, success or not.
        match self.provider.delete_media(&job.id).await {
            Ok(()) => tracing::debug!(resource = %job.id, "remote media deleted"),
            Err(e) => tracing::warn!(resource = %job.id, "remote cleanup failed: {:#}", e),
        }

        outcome
    }

    async fn critique_uploaded(
        &self,
        job: RemoteJob,
        mime_type: &str,
        exercise: Option<&str>,
    ) -> Result<CritiqueResult> {
        let job = self.await_readiness(job).await?;

        let prompt = build_prompt(exercise);
        let options = GenerationOptions {
            temperature: Some(0.4),
            max_output_tokens: Some(2048),
        };
        let text = self
            .provider
            .generate_critique(&job, mime_type, &prompt, &options)
            .await?;

        parse_critique(&text)
    }

    /// Poll the job at a fixed interval until it is active or failed.
    ///
    /// When the deadline elapses the loop exits without error and the
    /// current handle is used as-is. The provider is assumed usably ready
    /// even without formal confirmation; the warn log marks each occurrence.
    async fn await_readiness(&self, mut job: RemoteJob) -> Result<RemoteJob> {
        let deadline = Instant::now() + self.poll_deadline;
        loop {
            tracing::debug!(resource = %job.id, state = ?job.state, "remote job state");
            match job.state {
                JobState::Active => return Ok(job),
                JobState::Failed => {
                    return Err(AnalysisError::RemoteProcessingFailed(
                        "provider reported the uploaded media as failed".to_string(),
                    ))
                }
                JobState::Pending => {}
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    resource = %job.id,
                    "readiness poll deadline elapsed; proceeding with unconfirmed resource"
                );
                return Ok(job);
            }
            tokio::time::sleep(self.poll_interval).await;
            job = self.provider.job_state(&job.id).await?;
        }
    }
}
