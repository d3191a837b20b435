#![warn(missing_docs)]
//! # gender-lens-analysis-contract
//!
//! ## Purpose
//! Defines the request/response contract with the remote classification
//! service.
//!
//! ## Responsibilities
//! - Own the fixed instruction text sent alongside every image.
//! - Strip optional code-fence wrapping from the service reply.
//! - Decode the reply into [`ClassificationPayload`].
//!
//! ## Data flow
//! Raw reply text -> [`strip_code_fence`] -> [`parse_classification_payload`]
//! -> `gender_lens_core::classify`.
//!
//! ## Error model
//! Malformed JSON returns [`AnalysisContractError::Decode`]; a reply that is
//! blank after unwrapping returns [`AnalysisContractError::EmptyResponse`].

use std::sync::LazyLock;

use gender_lens_core::ClassificationPayload;
use regex::Regex;
use thiserror::Error;

/// Instruction sent with every image. The reply must be a bare JSON object.
pub const CLASSIFICATION_INSTRUCTION: &str = "Analyze all human faces in this image. For each face, perceive its gender as 'Male', 'Female', or 'Indeterminate'.
Respond strictly in JSON format with the following structure:
{
  \"male_count\": <integer>,
  \"female_count\": <integer>,
  \"indeterminate_count\": <integer>,
  \"no_face_detected\": <boolean>
}
If 'no_face_detected' is true, all counts must be 0.
If faces are detected, 'no_face_detected' must be false.
Only include detected human faces in the counts.";

/// Field names the reply object must use.
pub const PAYLOAD_FIELDS: [&str; 4] = [
    "male_count",
    "female_count",
    "indeterminate_count",
    "no_face_detected",
];

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$").expect("fence pattern is valid")
});

/// Removes a surrounding code fence, with or without a language tag.
///
/// Text without a complete fence is returned trimmed but otherwise untouched.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match FENCE.captures(trimmed).and_then(|captures| captures.get(2)) {
        Some(body) if !body.as_str().is_empty() => body.as_str().trim(),
        _ => trimmed,
    }
}

/// Decodes a raw service reply into a classification payload.
///
/// # Errors
/// Returns [`AnalysisContractError::EmptyResponse`] when nothing is left after
/// unwrapping and [`AnalysisContractError::Decode`] for malformed JSON.
pub fn parse_classification_payload(
    raw: &str,
) -> Result<ClassificationPayload, AnalysisContractError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(AnalysisContractError::EmptyResponse);
    }
    serde_json::from_str(body).map_err(AnalysisContractError::Decode)
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// Reply was blank.
    #[error("classification reply is empty")]
    EmptyResponse,
    /// JSON decode failure.
    #[error("classification decode failure: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    //! Unit tests for fence handling.

    use super::*;

    #[test]
    fn strips_fence_with_language_tag() {
        let raw = "```json\n{\"male_count\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"male_count\": 1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{}"), "```json\n{}");
    }

    #[test]
    fn instruction_names_every_payload_field() {
        for field in PAYLOAD_FIELDS {
            assert!(CLASSIFICATION_INSTRUCTION.contains(field));
        }
    }
}
