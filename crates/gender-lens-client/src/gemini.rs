//! Gemini `generateContent` implementation of [`ClassificationService`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use gender_lens_core::EncodedImage;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ApiKey, ClassificationService, ClientError, ServiceError};

/// Default API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default vision model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`GeminiService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    /// API base URL; must be HTTPS.
    pub endpoint: String,
    /// Model identifier.
    pub model: String,
    /// Upper bound for one request.
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP-backed classification service.
pub struct GeminiService {
    http: reqwest::Client,
    url: Url,
    api_key: ApiKey,
}

impl GeminiService {
    /// Builds a service after validating endpoint and model.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidEndpoint`] for non-HTTPS or unparsable
    /// endpoints, [`ClientError::EmptyModel`] for a blank model, and
    /// [`ClientError::HttpClient`] when the HTTP client cannot be built.
    pub fn new(api_key: ApiKey, config: &GeminiConfig) -> Result<Self, ClientError> {
        let url = generate_content_url(&config.endpoint, &config.model)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ClientError::HttpClient(error.to_string()))?;

        Ok(Self { http, url, api_key })
    }

    /// Fully resolved request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ClassificationService for GeminiService {
    async fn classify(
        &self,
        image: &EncodedImage,
        instruction: &str,
    ) -> Result<String, ServiceError> {
        let request = GenerateContentRequest::new(image, instruction);
        let response = self
            .http
            .post(self.url.clone())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|error| ServiceError::Transport(self.api_key.redact(&error.to_string())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ServiceError::Transport(self.api_key.redact(&error.to_string())))?;

        if !status.is_success() {
            return Err(map_error_response(status.as_u16(), &body));
        }

        extract_reply_text(&body)
    }
}

/// Validates the endpoint and appends the model path.
///
/// # Errors
/// Returns [`ClientError::InvalidEndpoint`] or [`ClientError::EmptyModel`].
pub fn generate_content_url(endpoint: &str, model: &str) -> Result<Url, ClientError> {
    let model = model.trim();
    if model.is_empty() {
        return Err(ClientError::EmptyModel);
    }

    let base = Url::parse(endpoint.trim())
        .map_err(|error| ClientError::InvalidEndpoint(format!("invalid url: {error}")))?;
    if base.scheme() != "https" {
        return Err(ClientError::InvalidEndpoint(
            "endpoint must use https".to_string(),
        ));
    }

    let joined = format!(
        "{}/models/{model}:generateContent",
        base.as_str().trim_end_matches('/')
    );
    Url::parse(&joined)
        .map_err(|error| ClientError::InvalidEndpoint(format!("invalid model path: {error}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(image: &'a EncodedImage, instruction: &'a str) -> Self {
        Self {
            contents: [RequestContent {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type(),
                            data: STANDARD.encode(image.bytes()),
                        },
                    },
                    RequestPart::Text { text: instruction },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Concatenates the text parts of the first candidate.
///
/// # Errors
/// Returns [`ServiceError::EmptyReply`] when there is no text, and
/// [`ServiceError::Transport`] when the body is not a response envelope.
pub fn extract_reply_text(body: &str) -> Result<String, ServiceError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|error| ServiceError::Transport(format!("unreadable response body: {error}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::EmptyReply);
    }
    Ok(text)
}

/// Maps a non-success response onto the service error taxonomy.
pub fn map_error_response(status: u16, body: &str) -> ServiceError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|envelope| envelope.error.message.clone())
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    let service_status = envelope
        .as_ref()
        .map(|envelope| envelope.error.status.as_str())
        .unwrap_or_default();
    let lowered = message.to_ascii_lowercase();

    if matches!(status, 401 | 403)
        || matches!(service_status, "UNAUTHENTICATED" | "PERMISSION_DENIED")
        || lowered.contains("api key not valid")
    {
        return ServiceError::InvalidCredentials(message);
    }

    if status == 429 || service_status == "RESOURCE_EXHAUSTED" || lowered.contains("quota") {
        return ServiceError::QuotaExhausted(message);
    }

    ServiceError::Status {
        status,
        message,
        body: Some(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for request shape and response mapping.

    use super::*;

    #[test]
    fn builds_model_url_and_rejects_plain_http() {
        let url = generate_content_url("https://example.test/v1beta/", "gemini-test")
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
        assert!(generate_content_url("http://example.test/v1beta", "m").is_err());
        assert!(matches!(
            generate_content_url(DEFAULT_ENDPOINT, " "),
            Err(ClientError::EmptyModel)
        ));
    }

    #[test]
    fn request_carries_inline_image_and_instruction() {
        let image = EncodedImage::new("image/jpeg", vec![1, 2, 3]).expect("image should build");
        let value = serde_json::to_value(GenerateContentRequest::new(&image, "describe"))
            .expect("request should serialize");

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "describe");
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn extracts_concatenated_text_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"male_count\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(
            extract_reply_text(body).expect("text should extract"),
            "{\"male_count\":1}"
        );
        assert_eq!(
            extract_reply_text(r#"{"candidates":[]}"#),
            Err(ServiceError::EmptyReply)
        );
    }

    #[test]
    fn maps_error_envelopes() {
        let invalid_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            map_error_response(400, invalid_key),
            ServiceError::InvalidCredentials(_)
        ));

        let quota = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            map_error_response(429, quota),
            ServiceError::QuotaExhausted(_)
        ));

        match map_error_response(500, "upstream exploded") {
            ServiceError::Status {
                status, message, ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
