#![warn(missing_docs)]
//! # gender-lens-upload
//!
//! ## Purpose
//! Validates, reads, and analyzes one user-supplied image file at a time.
//!
//! ## Responsibilities
//! - Reject non-image submissions locally, before any remote call.
//! - Read and sniff the selected file asynchronously.
//! - Track the upload channel's phase, result, and validation error.
//! - Fingerprint decoded uploads for log correlation.
//!
//! ## Data flow
//! [`UploadRequest`] -> [`UploadChannel::submit`] -> [`read_upload`] ->
//! [`UploadChannel::image_ready`] -> [`UploadPipeline::analyze`] ->
//! [`UploadChannel::complete`].
//!
//! ## Error model
//! Local failures are [`UploadError`] values; each maps to exactly one
//! user-facing message through [`UploadError::user_message`].
//!
//! ## Security and privacy notes
//! Image bytes are never logged; only the fingerprint and size are.

use std::path::{Path, PathBuf};

use gender_lens_client::AnalysisClient;
use gender_lens_core::{AnalysisResult, CredentialAvailability, EncodedImage, is_image_mime_type};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Validation message for a non-image submission.
pub const MESSAGE_INVALID_FILE_TYPE: &str = "Invalid file type. Please upload an image.";
/// Result message when the file cannot be read.
pub const MESSAGE_READ_FAILED: &str = "Failed to read the selected file.";
/// Result message when the file content is not a recognizable image.
pub const MESSAGE_DECODE_FAILED: &str = "The selected file could not be decoded as an image.";

const MESSAGE_KEY_NOT_CONFIGURED: &str = "Gemini API Key is not configured.";
const FINGERPRINT_HEX_LEN: usize = 16;

/// One file selected by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Path of the selected file.
    pub path: PathBuf,
    /// Content type declared by the picker, if any.
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Request whose type is inferred from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content_type: None,
        }
    }

    /// Request with an explicit declared content type.
    pub fn with_content_type(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: Some(content_type.into()),
        }
    }

    /// Declared content type, falling back to the extension's image type.
    pub fn effective_content_type(&self) -> Option<String> {
        match &self.content_type {
            Some(declared) if !declared.trim().is_empty() => Some(declared.trim().to_string()),
            _ => ImageFormat::from_path(&self.path)
                .ok()
                .map(|format| format.to_mime_type().to_string()),
        }
    }
}

/// Checks that the request names an image.
///
/// # Errors
/// Returns [`UploadError::InvalidType`] for a non-image or unknown type.
pub fn validate_request(request: &UploadRequest) -> Result<String, UploadError> {
    match request.effective_content_type() {
        Some(mime_type) if is_image_mime_type(&mime_type) => Ok(mime_type),
        Some(mime_type) => Err(UploadError::InvalidType(mime_type)),
        None => Err(UploadError::InvalidType("unknown".to_string())),
    }
}

/// Reads the whole file and sniffs its image format from the content.
///
/// # Errors
/// Returns [`UploadError::Read`] for I/O failures and [`UploadError::Decode`]
/// when the bytes are not a recognizable image.
pub async fn read_upload(path: &Path) -> Result<EncodedImage, UploadError> {
    let bytes = tokio::fs::read(path).await.map_err(|error| UploadError::Read {
        path: path.display().to_string(),
        detail: error.to_string(),
    })?;
    encode_upload(bytes)
}

/// Wraps raw file bytes as an [`EncodedImage`] using the sniffed format.
///
/// # Errors
/// Returns [`UploadError::Decode`] when the format cannot be recognized.
pub fn encode_upload(bytes: Vec<u8>) -> Result<EncodedImage, UploadError> {
    let format = image::guess_format(&bytes).map_err(|error| UploadError::Decode(error.to_string()))?;
    EncodedImage::new(format.to_mime_type(), bytes)
        .map_err(|error| UploadError::Decode(error.to_string()))
}

/// Short SHA-256 hex prefix of the image bytes.
pub fn image_fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_HEX_LEN);
    encoded
}

/// Phase of the upload channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Nothing submitted, or cleared.
    Idle,
    /// File is being read.
    Validating,
    /// Remote analysis in flight.
    Detecting,
    /// Terminal result available.
    Finished,
}

/// Identity of one accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTicket(u64);

impl UploadTicket {
    /// Submission sequence number.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Decision returned by [`UploadChannel::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Caller must read the file and report back with this ticket.
    Accepted(UploadTicket),
    /// Request failed local validation; the validation error is set.
    Invalid,
    /// Credentials are missing; nothing changed.
    RejectedNoCredentials,
    /// Another upload is processing; nothing changed.
    RejectedBusy,
}

/// Per-session upload channel.
#[derive(Debug, Clone)]
pub struct UploadChannel {
    credentials: CredentialAvailability,
    phase: UploadPhase,
    sequence: u64,
    in_flight: Option<UploadTicket>,
    validation_error: Option<String>,
    result: AnalysisResult,
}

impl UploadChannel {
    /// Creates an idle channel. Missing credentials show immediately.
    pub fn new(credentials: CredentialAvailability) -> Self {
        Self {
            credentials,
            phase: UploadPhase::Idle,
            sequence: 0,
            in_flight: None,
            validation_error: None,
            result: Self::resting_result(credentials),
        }
    }

    fn resting_result(credentials: CredentialAvailability) -> AnalysisResult {
        if credentials.is_available() {
            AnalysisResult::idle()
        } else {
            AnalysisResult::credential_missing(MESSAGE_KEY_NOT_CONFIGURED)
        }
    }

    /// Validates and accepts one request.
    pub fn submit(&mut self, request: &UploadRequest) -> SubmitOutcome {
        if !self.credentials.is_available() {
            return SubmitOutcome::RejectedNoCredentials;
        }
        if self.is_processing() {
            return SubmitOutcome::RejectedBusy;
        }

        if let Err(error) = validate_request(request) {
            tracing::info!(
                stage = "upload",
                action = "rejected",
                reason = %error,
                "upload failed local validation"
            );
            self.phase = UploadPhase::Idle;
            self.validation_error = Some(error.user_message().to_string());
            self.result = AnalysisResult::idle();
            return SubmitOutcome::Invalid;
        }

        self.sequence += 1;
        let ticket = UploadTicket(self.sequence);
        self.in_flight = Some(ticket);
        self.phase = UploadPhase::Validating;
        self.validation_error = None;
        self.result = AnalysisResult::detecting();
        SubmitOutcome::Accepted(ticket)
    }

    /// File read finished. Returns `true` when the caller should run analysis.
    pub fn image_ready(&mut self, ticket: UploadTicket, read: Result<(), &UploadError>) -> bool {
        if self.in_flight != Some(ticket) || self.phase != UploadPhase::Validating {
            return false;
        }
        match read {
            Ok(()) => {
                self.phase = UploadPhase::Detecting;
                true
            }
            Err(error) => {
                self.in_flight = None;
                self.phase = UploadPhase::Finished;
                self.result = AnalysisResult::error(error.user_message());
                false
            }
        }
    }

    /// Writes the analysis result. Returns `false` for a stale ticket.
    pub fn complete(&mut self, ticket: UploadTicket, result: AnalysisResult) -> bool {
        if self.in_flight != Some(ticket) || self.phase != UploadPhase::Detecting {
            return false;
        }
        self.in_flight = None;
        self.phase = UploadPhase::Finished;
        self.result = result;
        true
    }

    /// Resets result and validation error; a pending submission becomes stale.
    pub fn clear(&mut self) {
        self.in_flight = None;
        self.phase = UploadPhase::Idle;
        self.validation_error = None;
        self.result = Self::resting_result(self.credentials);
    }

    /// Whether a submission is being read or analyzed.
    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current phase.
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Current result.
    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    /// Local validation message of the last rejected submission.
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }
}

/// Stateless read-and-analyze helper bound to one analysis client.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    client: AnalysisClient,
}

impl UploadPipeline {
    /// Wraps a client.
    pub fn new(client: AnalysisClient) -> Self {
        Self { client }
    }

    /// Sends one decoded upload for analysis.
    pub async fn analyze(&self, image: &EncodedImage) -> AnalysisResult {
        tracing::info!(
            stage = "upload",
            action = "analyze",
            fingerprint = %image_fingerprint(image.bytes()),
            bytes = image.len(),
            mime_type = image.mime_type(),
            "analyzing uploaded image"
        );
        self.client.analyze(image).await
    }
}

/// Upload layer error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// Declared or inferred type is not an image.
    #[error("invalid file type: {0}")]
    InvalidType(String),
    /// File could not be read.
    #[error("failed to read {path}: {detail}")]
    Read {
        /// Selected path.
        path: String,
        /// I/O error text.
        detail: String,
    },
    /// Content is not a recognizable image.
    #[error("not a recognizable image: {0}")]
    Decode(String),
}

impl UploadError {
    /// User-facing message for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidType(_) => MESSAGE_INVALID_FILE_TYPE,
            Self::Read { .. } => MESSAGE_READ_FAILED,
            Self::Decode(_) => MESSAGE_DECODE_FAILED,
        }
    }
}
