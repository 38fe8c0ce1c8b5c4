//! Extraction and validation of the provider's critique text.
//!
//! Model output arrives as text that may wrap the JSON payload in a fenced
//! code block. Extraction is an explicit strategy: a ```json-labeled fence
//! wins, then an unlabeled fence, else the whole text is treated as raw
//! JSON. Decoding targets the whitelisted critique shape; unknown keys are
//! dropped and absent fields are tolerated.

use crate::error::{AnalysisError, Result};

use super::CritiqueResult;

/// Where the JSON payload was found in the response text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload<'a> {
    /// Content of a block explicitly labeled as JSON.
    FencedJson(&'a str),
    /// Content between the first pair of unlabeled fences.
    Fenced(&'a str),
    /// No fences; the text itself.
    Raw(&'a str),
}

impl<'a> Payload<'a> {
    fn content(self) -> &'a str {
        match self {
            Self::FencedJson(s) | Self::Fenced(s) | Self::Raw(s) => s,
        }
    }
}

fn extract_payload(text: &str) -> Payload<'_> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + "```json".len()..];
        let end = rest.find("```").unwrap_or(rest.len());
        return Payload::FencedJson(rest[..end].trim());
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + "```".len()..];
        let end = rest.find("```").unwrap_or(rest.len());
        return Payload::Fenced(rest[..end].trim());
    }
    Payload::Raw(trimmed)
}

/// Parse the provider's response text into a critique.
///
/// Fails with `MalformedOutput` on any decode error, preserving the raw
/// text for diagnostics.
pub fn parse_critique(text: &str) -> Result<CritiqueResult> {
    let payload = extract_payload(text);
    serde_json::from_str(payload.content()).map_err(|e| {
        tracing::error!("critique decode failed: {} | raw: {}", e, text);
        AnalysisError::MalformedOutput {
            raw: text.to_string(),
        }
    })
}
