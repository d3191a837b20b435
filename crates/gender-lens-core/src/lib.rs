#![warn(missing_docs)]
//! # gender-lens-core
//!
//! ## Purpose
//! Defines the pure data model and the result classifier shared across the
//! `gender-lens` workspace.
//!
//! ## Responsibilities
//! - Represent analysis statuses, gender counts, and per-channel results.
//! - Classify a decoded service payload into one normalized [`AnalysisResult`].
//! - Carry encoded images between sources, uploads, and the analysis client.
//!
//! ## Data flow
//! Media source or upload produces an [`EncodedImage`] -> analysis client
//! decodes the service reply into [`ClassificationPayload`] -> [`classify`]
//! yields the [`AnalysisResult`] stored in session state.
//!
//! ## Ownership and lifetimes
//! Results are owned values replaced wholesale on every transition; nothing
//! in a channel is mutated in place.
//!
//! ## Error model
//! The classifier is total and has no error path. Image construction rejects
//! empty buffers and non-image MIME types with [`CoreError`].
//!
//! ## Example
//! ```rust
//! use gender_lens_core::{classify, AnalysisStatus, ClassificationPayload};
//!
//! let result = classify(&ClassificationPayload::counts(2, 1, 0));
//! assert_eq!(result.status(), AnalysisStatus::Success);
//! assert_eq!(result.counts().map(|c| c.total()), Some(3));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message for a payload that explicitly reports no faces.
pub const MESSAGE_NO_FACE_DETECTED: &str = "No human faces were detected in the image.";
/// Message for a payload that reports faces but classifies none.
pub const MESSAGE_NO_FACE_CLASSIFIED: &str = "No human faces were clearly classified.";
/// Message for mixed determinate and indeterminate faces.
pub const MESSAGE_PARTIAL_DETECTION: &str = "Some face genders could not be determined.";
/// Message when every detected face is indeterminate.
pub const MESSAGE_ALL_INDETERMINATE: &str = "Could not determine gender for any detected faces.";
/// Message for a fully determinate analysis.
pub const MESSAGE_SUCCESS: &str = "Analysis complete.";

/// Closed set of UI-facing analysis statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisStatus {
    /// Channel is active but no attempt has run yet.
    Idle,
    /// Attempt is in flight.
    Detecting,
    /// Every detected face was classified.
    Success,
    /// No face was detected or classified.
    NoFaceDetected,
    /// Some faces classified, some indeterminate.
    PartialDetection,
    /// All detected faces are indeterminate.
    AllIndeterminate,
    /// Per-attempt failure.
    Error,
    /// Media source could not be acquired.
    SourceError,
    /// Service credentials are absent or rejected.
    CredentialMissing,
}

impl AnalysisStatus {
    /// Returns `true` for every status except [`AnalysisStatus::Detecting`].
    pub fn is_terminal(self) -> bool {
        self != Self::Detecting
    }

    /// Returns `true` when a result with this status must carry a message.
    pub fn requires_message(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::SourceError
                | Self::CredentialMissing
                | Self::NoFaceDetected
                | Self::PartialDetection
                | Self::AllIndeterminate
        )
    }

    /// Fixed display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Detecting => "Detecting...",
            Self::Success => "Analysis Complete",
            Self::NoFaceDetected => "No Faces Detected",
            Self::PartialDetection => "Partial Detection",
            Self::AllIndeterminate => "All Detected Faces Indeterminate",
            Self::Error => "Error",
            Self::SourceError => "Camera Error",
            Self::CredentialMissing => "API Key Missing",
        }
    }
}

/// Per-gender face counts for one analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderCounts {
    /// Faces perceived as male.
    pub male: u32,
    /// Faces perceived as female.
    pub female: u32,
    /// Faces whose gender could not be determined.
    pub indeterminate: u32,
}

impl GenderCounts {
    /// Creates counts from the three components.
    pub fn new(male: u32, female: u32, indeterminate: u32) -> Self {
        Self {
            male,
            female,
            indeterminate,
        }
    }

    /// Total detected faces.
    pub fn total(&self) -> u64 {
        u64::from(self.male) + u64::from(self.female) + u64::from(self.indeterminate)
    }

    /// Returns `true` when at least one face has a determinate gender.
    pub fn has_determinate(&self) -> bool {
        self.male > 0 || self.female > 0
    }
}

/// Normalized result of one attempt on one channel.
///
/// Fields are private so every value goes through a constructor that keeps
/// the status/message/counts invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<GenderCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

impl AnalysisResult {
    /// Fresh channel result.
    pub fn idle() -> Self {
        Self::bare(AnalysisStatus::Idle, None)
    }

    /// Idle result with an explanatory message (for example a disabled camera).
    pub fn idle_with_message(message: impl Into<String>) -> Self {
        Self::bare(AnalysisStatus::Idle, Some(message.into()))
    }

    /// Transient in-flight result.
    pub fn detecting() -> Self {
        Self::bare(AnalysisStatus::Detecting, None)
    }

    /// Per-attempt failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(AnalysisStatus::Error, Some(message.into()))
    }

    /// Media source failure.
    pub fn source_error(message: impl Into<String>) -> Self {
        Self::bare(AnalysisStatus::SourceError, Some(message.into()))
    }

    /// Missing or rejected credentials.
    pub fn credential_missing(message: impl Into<String>) -> Self {
        Self::bare(AnalysisStatus::CredentialMissing, Some(message.into()))
    }

    fn bare(status: AnalysisStatus, message: Option<String>) -> Self {
        Self {
            status,
            counts: None,
            message,
            raw: None,
        }
    }

    /// Attaches the raw service text kept for diagnostics.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Current status.
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    /// Counts, present only after a successfully decoded service reply.
    pub fn counts(&self) -> Option<&GenderCounts> {
        self.counts.as_ref()
    }

    /// Explanatory message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Raw service text.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::idle()
    }
}

/// One of the two independent analysis pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Timed capture from a live source.
    Live,
    /// One-shot analysis of an uploaded file.
    Upload,
}

impl Channel {
    /// Short lowercase name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Upload => "upload",
        }
    }
}

/// Process-wide credential availability, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialAvailability {
    /// A non-empty API key was configured.
    Available,
    /// No usable API key was configured.
    Missing,
}

impl CredentialAvailability {
    /// Returns `true` when credentials are available.
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

/// Decoded service payload consumed by [`classify`].
///
/// Absent or `null` counts decode as zero; an absent flag decodes as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPayload {
    /// Number of male faces.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub male_count: u32,
    /// Number of female faces.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub female_count: u32,
    /// Number of faces with indeterminate gender.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub indeterminate_count: u32,
    /// Service reported that no face is present.
    #[serde(default, deserialize_with = "null_as_false")]
    pub no_face_detected: bool,
}

impl ClassificationPayload {
    /// Payload with counts and `no_face_detected = false`.
    pub fn counts(male: u32, female: u32, indeterminate: u32) -> Self {
        Self {
            male_count: male,
            female_count: female,
            indeterminate_count: indeterminate,
            no_face_detected: false,
        }
    }

    /// Payload explicitly reporting no faces.
    pub fn no_face() -> Self {
        Self {
            no_face_detected: true,
            ..Self::default()
        }
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Maps a decoded payload into a normalized result.
///
/// Rules are applied in order; the first match wins:
/// 1. `no_face_detected` -> `NoFaceDetected` with zeroed counts.
/// 2. zero total -> `NoFaceDetected`.
/// 3. indeterminate plus determinate faces -> `PartialDetection`.
/// 4. only indeterminate faces -> `AllIndeterminate`.
/// 5. otherwise `Success`.
pub fn classify(payload: &ClassificationPayload) -> AnalysisResult {
    if payload.no_face_detected {
        return classified(
            AnalysisStatus::NoFaceDetected,
            GenderCounts::default(),
            MESSAGE_NO_FACE_DETECTED,
        );
    }

    let counts = GenderCounts::new(
        payload.male_count,
        payload.female_count,
        payload.indeterminate_count,
    );

    if counts.total() == 0 {
        return classified(
            AnalysisStatus::NoFaceDetected,
            counts,
            MESSAGE_NO_FACE_CLASSIFIED,
        );
    }

    if counts.indeterminate > 0 {
        if counts.has_determinate() {
            return classified(
                AnalysisStatus::PartialDetection,
                counts,
                MESSAGE_PARTIAL_DETECTION,
            );
        }
        return classified(
            AnalysisStatus::AllIndeterminate,
            counts,
            MESSAGE_ALL_INDETERMINATE,
        );
    }

    classified(AnalysisStatus::Success, counts, MESSAGE_SUCCESS)
}

fn classified(status: AnalysisStatus, counts: GenderCounts, message: &str) -> AnalysisResult {
    AnalysisResult {
        status,
        counts: Some(counts),
        message: Some(message.to_string()),
        raw: None,
    }
}

/// Encoded still image handed to the analysis client.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    /// Constructs a validated image.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyImage`] for an empty buffer and
    /// [`CoreError::InvalidMimeType`] when the type is not `image/*`.
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CoreError> {
        let mime_type = mime_type.into();
        if !is_image_mime_type(&mime_type) {
            return Err(CoreError::InvalidMimeType(mime_type));
        }
        if bytes.is_empty() {
            return Err(CoreError::EmptyImage);
        }
        Ok(Self { mime_type, bytes })
    }

    /// MIME type, for example `image/jpeg`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false` for a constructed image.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for EncodedImage {
    // Image bytes stay out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Returns `true` for MIME types in the `image/` family.
pub fn is_image_mime_type(mime_type: &str) -> bool {
    mime_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Error type for core value construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Image buffer is empty.
    #[error("image buffer is empty")]
    EmptyImage,
    /// MIME type is not in the `image/` family.
    #[error("not an image mime type: {0}")]
    InvalidMimeType(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for classifier edge cases and value invariants.

    use super::*;

    #[test]
    fn no_face_flag_zeroes_counts() {
        let payload = ClassificationPayload {
            male_count: 3,
            female_count: 1,
            indeterminate_count: 2,
            no_face_detected: true,
        };
        let result = classify(&payload);
        assert_eq!(result.status(), AnalysisStatus::NoFaceDetected);
        assert_eq!(result.counts(), Some(&GenderCounts::default()));
        assert_eq!(result.message(), Some(MESSAGE_NO_FACE_DETECTED));
    }

    #[test]
    fn total_is_computed_without_overflow() {
        let counts = GenderCounts::new(u32::MAX, u32::MAX, 1);
        assert_eq!(counts.total(), u64::from(u32::MAX) * 2 + 1);
    }

    #[test]
    fn message_invariant_holds_for_constructors() {
        for result in [
            AnalysisResult::error("e"),
            AnalysisResult::source_error("s"),
            AnalysisResult::credential_missing("c"),
            classify(&ClassificationPayload::no_face()),
            classify(&ClassificationPayload::counts(1, 0, 1)),
            classify(&ClassificationPayload::counts(0, 0, 1)),
        ] {
            assert!(result.status().requires_message());
            assert!(result.message().is_some());
        }
        assert!(AnalysisResult::detecting().counts().is_none());
    }

    #[test]
    fn rejects_non_image_mime_types() {
        assert_eq!(
            EncodedImage::new("text/plain", vec![1]),
            Err(CoreError::InvalidMimeType("text/plain".to_string()))
        );
        assert_eq!(
            EncodedImage::new("image/png", Vec::new()),
            Err(CoreError::EmptyImage)
        );
        assert!(is_image_mime_type("IMAGE/JPEG"));
        assert!(!is_image_mime_type("image/"));
    }
}
