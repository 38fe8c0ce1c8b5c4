//! Inference provider client module.
//!
//! This module provides a trait-based abstraction over the remote
//! media-understanding provider, with the Gemini file API as the primary
//! implementation. One analysis consumes four provider calls: upload a
//! media resource, poll its processing state, request a structured
//! critique referencing it, and delete it.

mod gemini;

pub use gemini::GeminiFileClient;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Readiness state of an uploaded remote resource.
///
/// Providers report richer state strings; everything that is neither
/// active nor failed decodes as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(other)]
    Pending,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Provider-side handle to uploaded media and its processing state.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    /// Opaque remote resource identifier (e.g. `files/abc123`).
    pub id: String,
    pub state: JobState,
    /// Dereferenceable URI, present once the provider has one.
    pub uri: Option<String>,
}

/// Optional parameters for structured-critique generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Sampling temperature (0 = deterministic).
    pub temperature: Option<f64>,
    /// Maximum output tokens to generate.
    pub max_output_tokens: Option<u64>,
}

/// Trait for inference provider clients.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Upload the staged media as a new remote resource of the declared type.
    async fn upload_media(&self, path: &Path, mime_type: &str) -> Result<RemoteJob>;

    /// Fetch the current state of a previously uploaded resource.
    async fn job_state(&self, id: &str) -> Result<RemoteJob>;

    /// Request one structured critique referencing the job's URI.
    /// Returns the raw text of the provider's response.
    async fn generate_critique(
        &self,
        job: &RemoteJob,
        mime_type: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String>;

    /// Delete the remote resource. Callers treat this as advisory.
    async fn delete_media(&self, id: &str) -> anyhow::Result<()>;
}
