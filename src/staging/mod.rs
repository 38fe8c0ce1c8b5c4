//! Local staging of inbound media.
//!
//! An uploaded byte stream is persisted to a collision-resistant temporary
//! file before being shipped to the inference provider. The artifact carries
//! a deletion obligation: the pipeline releases it on every exit path, and
//! release never fails the caller.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AnalysisError, Result};

/// Suffixes accepted verbatim; anything else is staged as `.mp4`.
const KNOWN_SUFFIXES: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm", ".m4v"];

const DEFAULT_SUFFIX: &str = ".mp4";

/// A staged copy of the uploaded media, owning its deletion obligation.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    suffix: &'static str,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type declared when uploading this artifact to the provider.
    pub fn mime_type(&self) -> &'static str {
        match self.suffix {
            ".mov" => "video/quicktime",
            ".avi" => "video/x-msvideo",
            ".mkv" => "video/x-matroska",
            ".webm" => "video/webm",
            _ => "video/mp4",
        }
    }

    /// Delete the staged file. Deletion errors are logged, never propagated.
    pub async fn release(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "staged artifact released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to release staged artifact: {}", e)
            }
        }
    }
}

/// Writes inbound media streams into a staging directory.
#[derive(Debug, Clone)]
pub struct MediaStager {
    root: PathBuf,
}

impl MediaStager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Persist the full input stream to a new temporary file.
    ///
    /// Fails with `IoFault` if the directory is unwritable or the stream is
    /// truncated mid-copy; a partial file is removed before returning.
    pub async fn stage<S, E>(&self, mut stream: S, suffix: Option<&str>) -> Result<StagedArtifact>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let suffix = normalize_suffix(suffix);
        let path = self
            .root
            .join(format!("analysis-{}{}", Uuid::new_v4(), suffix));

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| AnalysisError::IoFault(format!("create {}: {}", path.display(), e)))?;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(AnalysisError::IoFault(format!("media stream truncated: {}", e)));
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(AnalysisError::IoFault(format!("write {}: {}", path.display(), e)));
            }
        }
        if let Err(e) = file.flush().await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AnalysisError::IoFault(format!("flush {}: {}", path.display(), e)));
        }

        tracing::info!(path = %path.display(), "media staged");
        Ok(StagedArtifact { path, suffix })
    }
}

fn normalize_suffix(suffix: Option<&str>) -> &'static str {
    match suffix {
        Some(s) => KNOWN_SUFFIXES
            .iter()
            .find(|k| s.eq_ignore_ascii_case(k))
            .copied()
            .unwrap_or(DEFAULT_SUFFIX),
        None => DEFAULT_SUFFIX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn one_chunk(data: &'static [u8]) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    #[tokio::test]
    async fn stage_writes_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let stager = MediaStager::new(dir.path().to_path_buf());

        let artifact = stager.stage(one_chunk(b"frames"), Some(".mov")).await.unwrap();
        let path = artifact.path().to_path_buf();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"frames");
        assert_eq!(artifact.mime_type(), "video/quicktime");

        artifact.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unrecognized_suffix_defaults_to_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let stager = MediaStager::new(dir.path().to_path_buf());

        let artifact = stager.stage(one_chunk(b"x"), Some(".exe")).await.unwrap();
        assert!(artifact.path().to_string_lossy().ends_with(".mp4"));
        assert_eq!(artifact.mime_type(), "video/mp4");
        artifact.release().await;

        let artifact = stager.stage(one_chunk(b"x"), None).await.unwrap();
        assert!(artifact.path().to_string_lossy().ends_with(".mp4"));
        artifact.release().await;
    }

    #[tokio::test]
    async fn truncated_stream_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let stager = MediaStager::new(dir.path().to_path_buf());

        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset"),
        ]);
        let err = stager.stage(stream, None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::IoFault(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_root_is_io_fault() {
        let stager = MediaStager::new(PathBuf::from("/nonexistent/staging/root"));
        let err = stager.stage(one_chunk(b"x"), None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::IoFault(_)));
    }

    #[tokio::test]
    async fn release_of_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let stager = MediaStager::new(dir.path().to_path_buf());
        let artifact = stager.stage(one_chunk(b"x"), None).await.unwrap();
        tokio::fs::remove_file(artifact.path()).await.unwrap();
        // Must not panic or error.
        artifact.release().await;
    }
}
