//! Pipeline controller - sequences one analysis call end to end.
//!
//! Linear state machine, branch-on-failure, no retries: quota pre-check,
//! stage the media, run the inference session, charge quota, assemble the
//! payload. Quota is charged only after a successful critique, and the
//! staged artifact is released on every exit path.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;

use crate::analysis::InferenceSession;
use crate::api::types::AnalysisResponse;
use crate::config::Config;
use crate::error::{AnalysisError, Result};
use crate::ledger::{QuotaLedger, QuotaSnapshot};
use crate::provider::InferenceProvider;
use crate::staging::{MediaStager, StagedArtifact};

/// One inbound analysis call, owned by the pipeline for its lifetime.
pub struct AnalysisRequest<S> {
    /// Opaque bearer credential, forwarded to the ledger.
    pub token: String,
    /// Raw media byte stream.
    pub media: S,
    /// File suffix inferred from the uploaded filename.
    pub suffix: Option<String>,
    /// Optional exercise-label hint for the critique prompt.
    pub exercise: Option<String>,
}

pub struct Pipeline {
    stager: MediaStager,
    ledger: Arc<dyn QuotaLedger>,
    session: InferenceSession,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn QuotaLedger>,
        provider: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            stager: MediaStager::new(config.staging_dir.clone()),
            ledger,
            session: InferenceSession::new(provider, config.poll_interval, config.poll_deadline),
        }
    }

    /// Run one analysis call.
    ///
    /// A disallowed quota pre-check short-circuits before any artifact is
    /// created; any later failure still releases the staged artifact.
    pub async fn analyze<S, E>(&self, request: AnalysisRequest<S>) -> Result<AnalysisResponse>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let quota = self.ledger.check_quota(&request.token).await?;
        if !quota.allowed {
            tracing::info!(used = quota.used, limit = quota.limit, "quota exhausted");
            return Err(AnalysisError::QuotaExceeded {
                used: quota.used,
                limit: quota.limit,
                reset_time: quota.reset_time,
            });
        }

        let artifact = self
            .stager
            .stage(request.media, request.suffix.as_deref())
            .await?;

        let outcome = self
            .analyze_staged(&artifact, &request.token, request.exercise.as_deref())
            .await;

        artifact.release().await;
        outcome
    }

    async fn analyze_staged(
        &self,
        artifact: &StagedArtifact,
        token: &str,
        exercise: Option<&str>,
    ) -> Result<AnalysisResponse> {
        let critique = self.session.analyze(artifact, exercise).await?;

        // Charged only now, after the critique succeeded.
        let quota = self.ledger.increment_quota(token).await?;
        tracing::info!(used = quota.used, limit = quota.limit, "analysis charged");

        Ok(AnalysisResponse::assemble(critique, &quota))
    }

    /// Proxy the ledger's current snapshot for the caller.
    pub async fn quota_status(&self, token: &str) -> Result<QuotaSnapshot> {
        self.ledger.quota_status(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LedgerConfig, ProviderConfig};
    use crate::provider::{GenerationOptions, JobState, RemoteJob};
    use std::convert::Infallible;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const CRITIQUE_TEXT: &str =
        "```json\n{\"score\":75,\"status\":\"warning\",\"positives\":[\"Steady tempo\"],\"improvements\":[\"Brace harder\"]}\n```";

    struct FakeLedger {
        allowed: bool,
        used: i64,
        limit: i64,
        check_calls: AtomicUsize,
        increment_calls: AtomicUsize,
    }

    impl FakeLedger {
        fn new(allowed: bool, used: i64, limit: i64) -> Self {
            Self {
                allowed,
                used,
                limit,
                check_calls: AtomicUsize::new(0),
                increment_calls: AtomicUsize::new(0),
            }
        }

        fn snapshot(&self, used: i64) -> QuotaSnapshot {
            QuotaSnapshot {
                allowed: self.allowed,
                used,
                limit: self.limit,
                remaining: self.limit - used,
                reset_time: Some("2026-08-06T00:00:00Z".to_string()),
                is_paid: Some(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl QuotaLedger for FakeLedger {
        async fn check_quota(&self, _token: &str) -> Result<QuotaSnapshot> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot(self.used))
        }

        async fn increment_quota(&self, _token: &str) -> Result<QuotaSnapshot> {
            self.increment_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot(self.used + 1))
        }

        async fn quota_status(&self, _token: &str) -> Result<QuotaSnapshot> {
            Ok(self.snapshot(self.used))
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        fail_upload: bool,
        fail_generate: bool,
        upload_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl InferenceProvider for FakeProvider {
        async fn upload_media(&self, _path: &std::path::Path, _mime: &str) -> Result<RemoteJob> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                return Err(AnalysisError::UploadFailed("scripted".to_string()));
            }
            Ok(RemoteJob {
                id: "files/fake".to_string(),
                state: JobState::Active,
                uri: Some("https://provider.test/files/fake".to_string()),
            })
        }

        async fn job_state(&self, id: &str) -> Result<RemoteJob> {
            Ok(RemoteJob {
                id: id.to_string(),
                state: JobState::Active,
                uri: Some("https://provider.test/files/fake".to_string()),
            })
        }

        async fn generate_critique(
            &self,
            _job: &RemoteJob,
            _mime: &str,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String> {
            if self.fail_generate {
                return Err(AnalysisError::InferenceRequestFailed("scripted".to_string()));
            }
            Ok(CRITIQUE_TEXT.to_string())
        }

        async fn delete_media(&self, _id: &str) -> anyhow::Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config(staging_dir: PathBuf) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            provider: ProviderConfig {
                api_key: "test-key".to_string(),
                base_url: "https://provider.test".to_string(),
                model: "test-model".to_string(),
                timeout: Duration::from_secs(1),
            },
            ledger: LedgerConfig {
                base_url: "https://ledger.test".to_string(),
                timeout: Duration::from_secs(1),
            },
            staging_dir,
            poll_interval: Duration::from_millis(1),
            poll_deadline: Duration::from_millis(50),
        }
    }

    fn request(token: &str) -> AnalysisRequest<impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin>
    {
        AnalysisRequest {
            token: token.to_string(),
            media: futures::stream::iter(vec![Ok(Bytes::from_static(b"video bytes"))]),
            suffix: Some(".mp4".to_string()),
            exercise: Some("Squat".to_string()),
        }
    }

    fn staging_is_empty(dir: &tempfile::TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().count() == 0
    }

    #[tokio::test]
    async fn denied_quota_short_circuits_before_any_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(false, 5, 5));
        let provider = Arc::new(FakeProvider::default());
        let pipeline = Pipeline::new(
            &test_config(dir.path().to_path_buf()),
            Arc::clone(&ledger) as Arc<dyn QuotaLedger>,
            Arc::clone(&provider) as Arc<dyn InferenceProvider>,
        );

        let err = pipeline.analyze(request("tok")).await.unwrap_err();

        match err {
            AnalysisError::QuotaExceeded { used, limit, reset_time } => {
                assert_eq!(used, 5);
                assert_eq!(limit, 5);
                assert!(reset_time.is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(staging_is_empty(&dir));
        assert_eq!(provider.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.increment_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inference_failure_never_charges_quota() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(true, 2, 5));
        let provider = Arc::new(FakeProvider {
            fail_generate: true,
            ..Default::default()
        });
        let pipeline = Pipeline::new(
            &test_config(dir.path().to_path_buf()),
            Arc::clone(&ledger) as Arc<dyn QuotaLedger>,
            Arc::clone(&provider) as Arc<dyn InferenceProvider>,
        );

        let err = pipeline.analyze(request("tok")).await.unwrap_err();

        assert!(matches!(err, AnalysisError::InferenceRequestFailed(_)));
        assert_eq!(ledger.increment_calls.load(Ordering::SeqCst), 0);
        // Remote and local cleanup both ran.
        assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 1);
        assert!(staging_is_empty(&dir));
    }

    #[tokio::test]
    async fn upload_failure_releases_artifact_without_charging() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(true, 2, 5));
        let provider = Arc::new(FakeProvider {
            fail_upload: true,
            ..Default::default()
        });
        let pipeline = Pipeline::new(
            &test_config(dir.path().to_path_buf()),
            Arc::clone(&ledger) as Arc<dyn QuotaLedger>,
            Arc::clone(&provider) as Arc<dyn InferenceProvider>,
        );

        let err = pipeline.analyze(request("tok")).await.unwrap_err();

        assert!(matches!(err, AnalysisError::UploadFailed(_)));
        assert_eq!(ledger.increment_calls.load(Ordering::SeqCst), 0);
        // No remote job was created, so no remote deletion either.
        assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 0);
        assert!(staging_is_empty(&dir));
    }

    #[tokio::test]
    async fn successful_analysis_charges_once_and_assembles_payload() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(true, 2, 5));
        let provider = Arc::new(FakeProvider::default());
        let pipeline = Pipeline::new(
            &test_config(dir.path().to_path_buf()),
            Arc::clone(&ledger) as Arc<dyn QuotaLedger>,
            Arc::clone(&provider) as Arc<dyn InferenceProvider>,
        );

        let response = pipeline.analyze(request("tok")).await.unwrap();

        assert_eq!(ledger.check_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.increment_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.delete_calls.load(Ordering::SeqCst), 1);
        assert!(staging_is_empty(&dir));

        let payload = serde_json::to_value(&response).unwrap();
        assert!(!payload["id"].as_str().unwrap().is_empty());
        assert!(payload.get("recordedAt").is_some());
        // Post-increment snapshot, not the pre-check one.
        assert_eq!(payload["quota"]["used"], 3);
        assert_eq!(payload["quota"]["remaining"], 2);
        assert_eq!(payload["score"], 75);
        assert_eq!(payload["status"], "warning");
        assert_eq!(payload["positives"][0], "Steady tempo");
        assert_eq!(payload["improvements"][0], "Brace harder");
        assert_eq!(payload["actions"]["canSave"], true);
    }

    #[tokio::test]
    async fn two_calls_generate_distinct_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FakeLedger::new(true, 0, 5));
        let provider = Arc::new(FakeProvider::default());
        let pipeline = Pipeline::new(
            &test_config(dir.path().to_path_buf()),
            ledger as Arc<dyn QuotaLedger>,
            provider as Arc<dyn InferenceProvider>,
        );

        let first = pipeline.analyze(request("tok")).await.unwrap();
        let second = pipeline.analyze(request("tok")).await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
