#![warn(missing_docs)]
//! # gender-lens-client
//!
//! ## Purpose
//! Wraps one request to the remote classification service and translates the
//! outcome into an [`AnalysisResult`].
//!
//! ## Responsibilities
//! - Short-circuit to `CredentialMissing` when no service is configured.
//! - Send the image with the fixed contract instruction through an injectable
//!   [`ClassificationService`].
//! - Decode the reply (tolerating code fences) and classify it.
//! - Translate service failures into the status taxonomy.
//!
//! ## Data flow
//! [`EncodedImage`] -> [`AnalysisClient::analyze`] ->
//! [`ClassificationService::classify`] -> reply text -> contract decode ->
//! `gender_lens_core::classify`.
//!
//! ## Error model
//! [`AnalysisClient::analyze`] never fails: every outcome becomes exactly one
//! [`AnalysisResult`]. Service implementations report [`ServiceError`];
//! construction problems report [`ClientError`].
//!
//! ## Security and privacy notes
//! [`ApiKey`] never prints its value, and [`ApiKey::redact`] strips it from
//! text before logging.

use std::sync::Arc;

use async_trait::async_trait;
use gender_lens_analysis_contract::{CLASSIFICATION_INSTRUCTION, parse_classification_payload};
use gender_lens_core::{AnalysisResult, CredentialAvailability, EncodedImage, classify};
use thiserror::Error;

pub mod gemini;

pub use gemini::{GeminiConfig, GeminiService};

/// Result message when no service was configured at startup.
pub const MESSAGE_CLIENT_UNINITIALIZED: &str =
    "Gemini API client is not initialized. Check API Key.";
/// Result message when the service rejects the key.
pub const MESSAGE_INVALID_KEY: &str = "Invalid Gemini API Key. Please check your configuration.";
/// Result message when the service reports quota exhaustion.
pub const MESSAGE_QUOTA_EXCEEDED: &str = "API quota exceeded. Please try again later.";
/// Result message for any other service failure.
pub const MESSAGE_SERVICE_FAILURE: &str =
    "Failed to analyze image due to an API error or response issue.";
/// Result message for an undecodable reply.
pub const MESSAGE_PARSE_FAILURE: &str =
    "Failed to parse JSON response from AI. The format might be incorrect.";

/// Non-empty service API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for absent or blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Key value for request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replaces every occurrence of the key in `text`.
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.0, "<redacted>")
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Remote classification service seam.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Sends one image plus instruction and returns the raw reply text.
    ///
    /// # Errors
    /// Returns [`ServiceError`] for transport, status, or credential failures.
    async fn classify(
        &self,
        image: &EncodedImage,
        instruction: &str,
    ) -> Result<String, ServiceError>;
}

/// Coarse failure category used for status translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Key missing, invalid, or not permitted.
    InvalidCredentials,
    /// Usage quota exhausted.
    QuotaExhausted,
    /// Anything else.
    Other,
}

/// Failure reported by a [`ClassificationService`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Service rejected the credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// Service reported exhausted quota.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),
    /// Non-success HTTP status.
    #[error("service returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Human-readable service message.
        message: String,
        /// Raw response body.
        body: Option<String>,
    },
    /// Connection, timeout, or body read failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Successful response without any text part.
    #[error("service reply carried no text")]
    EmptyReply,
}

impl ServiceError {
    /// Categorizes the failure by variant, then by message text.
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            Self::InvalidCredentials(_) => ServiceErrorKind::InvalidCredentials,
            Self::QuotaExhausted(_) => ServiceErrorKind::QuotaExhausted,
            Self::Status { message, .. } | Self::Transport(message) => {
                let lowered = message.to_ascii_lowercase();
                if lowered.contains("api key not valid") {
                    ServiceErrorKind::InvalidCredentials
                } else if lowered.contains("quota") {
                    ServiceErrorKind::QuotaExhausted
                } else {
                    ServiceErrorKind::Other
                }
            }
            Self::EmptyReply => ServiceErrorKind::Other,
        }
    }

    /// Raw response body, when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

/// Client construction errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Endpoint violates URL or transport policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Model name is blank.
    #[error("model name must be non-empty")]
    EmptyModel,
    /// HTTP client could not be built.
    #[error("http client construction failed: {0}")]
    HttpClient(String),
}

/// Single-request analysis client.
#[derive(Clone)]
pub struct AnalysisClient {
    service: Option<Arc<dyn ClassificationService>>,
}

impl AnalysisClient {
    /// Client backed by a configured service.
    pub fn new(service: Arc<dyn ClassificationService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// Client without credentials; every call returns `CredentialMissing`.
    pub fn unconfigured() -> Self {
        Self { service: None }
    }

    /// Availability derived from whether a service was configured.
    pub fn credentials(&self) -> CredentialAvailability {
        if self.service.is_some() {
            CredentialAvailability::Available
        } else {
            CredentialAvailability::Missing
        }
    }

    /// Runs one analysis attempt.
    ///
    /// Without a service this returns before the first suspension point.
    pub async fn analyze(&self, image: &EncodedImage) -> AnalysisResult {
        let Some(service) = self.service.as_ref() else {
            tracing::warn!(
                stage = "analysis",
                action = "short_circuit",
                "classification service is not configured"
            );
            return AnalysisResult::credential_missing(MESSAGE_CLIENT_UNINITIALIZED);
        };

        tracing::debug!(
            stage = "analysis",
            action = "request",
            mime_type = image.mime_type(),
            bytes = image.len(),
            "sending image to classification service"
        );

        match service.classify(image, CLASSIFICATION_INSTRUCTION).await {
            Ok(raw) => interpret_reply(&raw),
            Err(error) => {
                tracing::warn!(
                    stage = "analysis",
                    action = "service_error",
                    kind = ?error.kind(),
                    "{error}"
                );
                translate_service_error(&error)
            }
        }
    }
}

impl std::fmt::Debug for AnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisClient")
            .field("credentials", &self.credentials())
            .finish()
    }
}

/// Decodes and classifies a raw reply, attaching the reply for diagnostics.
pub fn interpret_reply(raw: &str) -> AnalysisResult {
    match parse_classification_payload(raw) {
        Ok(payload) => classify(&payload).with_raw(raw),
        Err(error) => {
            tracing::warn!(stage = "analysis", action = "decode_failed", "{error}");
            AnalysisResult::error(MESSAGE_PARSE_FAILURE).with_raw(raw)
        }
    }
}

/// Maps a service failure into exactly one terminal result.
pub fn translate_service_error(error: &ServiceError) -> AnalysisResult {
    let result = match error.kind() {
        ServiceErrorKind::InvalidCredentials => {
            AnalysisResult::credential_missing(MESSAGE_INVALID_KEY)
        }
        ServiceErrorKind::QuotaExhausted => AnalysisResult::error(MESSAGE_QUOTA_EXCEEDED),
        ServiceErrorKind::Other => AnalysisResult::error(MESSAGE_SERVICE_FAILURE),
    };

    match error.body() {
        Some(body) => result.with_raw(body),
        None => result,
    }
}
