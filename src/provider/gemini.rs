//! Gemini file API implementation of the inference provider.
//!
//! Uses the raw-upload endpoint for media, the files resource for state
//! polls and deletion, and `generateContent` for the critique request.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderConfig;
use crate::error::{AnalysisError, Result};

use super::{GenerationOptions, InferenceProvider, JobState, RemoteJob};

pub struct GeminiFileClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileMeta,
}

#[derive(Debug, Deserialize)]
struct FileMeta {
    name: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    state: JobState,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl From<FileMeta> for RemoteJob {
    fn from(meta: FileMeta) -> Self {
        RemoteJob {
            id: meta.name,
            state: meta.state,
            uri: meta.uri,
        }
    }
}

impl GeminiFileClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?key={}", self.base_url, path, self.api_key)
    }
}

#[async_trait::async_trait]
impl InferenceProvider for GeminiFileClient {
    async fn upload_media(&self, path: &Path, mime_type: &str) -> Result<RemoteJob> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::UploadFailed(format!("read {}: {}", path.display(), e)))?;

        let response = self
            .http
            .post(self.url("/upload/v1beta/files"))
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AnalysisError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::UploadFailed(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::UploadFailed(format!("undecodable upload response: {}", e)))?;

        tracing::info!(resource = %upload.file.name, "media uploaded to provider");
        Ok(upload.file.into())
    }

    async fn job_state(&self, id: &str) -> Result<RemoteJob> {
        let response = self
            .http
            .get(self.url(&format!("/v1beta/{}", id)))
            .send()
            .await
            .map_err(|e| AnalysisError::RemoteProcessingFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RemoteProcessingFailed(format!(
                "state fetch returned {}: {}",
                status, body
            )));
        }

        let meta: FileMeta = response.json().await.map_err(|e| {
            AnalysisError::RemoteProcessingFailed(format!("undecodable state response: {}", e))
        })?;
        Ok(meta.into())
    }

    async fn generate_critique(
        &self,
        job: &RemoteJob,
        mime_type: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let uri = job.uri.as_deref().ok_or_else(|| {
            AnalysisError::InferenceRequestFailed("remote resource has no URI".to_string())
        })?;

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = options.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(m) = options.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(m));
        }

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "file_data": { "file_uri": uri, "mime_type": mime_type } },
                    { "text": prompt },
                ],
            }],
            "generationConfig": generation_config,
        });

        let response = self
            .http
            .post(self.url(&format!("/v1beta/models/{}:generateContent", self.model)))
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::InferenceRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::InferenceRequestFailed(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| {
            AnalysisError::InferenceRequestFailed(format!("undecodable generate response: {}", e))
        })?;

        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AnalysisError::InferenceRequestFailed(
                "provider returned an empty response".to_string(),
            ));
        }
        Ok(text)
    }

    async fn delete_media(&self, id: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/v1beta/{}", id)))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("delete returned {}", response.status());
        }
        Ok(())
    }
}
