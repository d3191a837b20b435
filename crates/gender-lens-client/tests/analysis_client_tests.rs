//! Integration tests for the analysis client request/response lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gender_lens_analysis_contract::CLASSIFICATION_INSTRUCTION;
use gender_lens_client::{
    AnalysisClient, ClassificationService, MESSAGE_CLIENT_UNINITIALIZED, MESSAGE_INVALID_KEY,
    MESSAGE_PARSE_FAILURE, MESSAGE_QUOTA_EXCEEDED, MESSAGE_SERVICE_FAILURE, ServiceError,
};
use gender_lens_core::{AnalysisStatus, CredentialAvailability, EncodedImage, GenderCounts};

struct ScriptedService {
    reply: Result<String, ServiceError>,
    calls: AtomicUsize,
}

impl ScriptedService {
    fn new(reply: Result<&str, ServiceError>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClassificationService for ScriptedService {
    async fn classify(
        &self,
        _image: &EncodedImage,
        instruction: &str,
    ) -> Result<String, ServiceError> {
        assert_eq!(instruction, CLASSIFICATION_INSTRUCTION);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

fn image() -> EncodedImage {
    EncodedImage::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]).expect("image fixture should build")
}

#[tokio::test]
async fn analysis_client_tests_unconfigured_client_short_circuits() {
    let client = AnalysisClient::unconfigured();
    assert_eq!(client.credentials(), CredentialAvailability::Missing);

    let result = client.analyze(&image()).await;
    assert_eq!(result.status(), AnalysisStatus::CredentialMissing);
    assert_eq!(result.message(), Some(MESSAGE_CLIENT_UNINITIALIZED));
    assert!(result.counts().is_none());
}

#[tokio::test]
async fn analysis_client_tests_fenced_reply_matches_bare_reply() {
    let bare = r#"{"male_count":2,"female_count":1,"indeterminate_count":0,"no_face_detected":false}"#;
    let fenced = format!("```json\n{bare}\n```");

    let bare_service = ScriptedService::new(Ok(bare));
    let fenced_service = ScriptedService::new(Ok(fenced.as_str()));
    let bare_result = AnalysisClient::new(bare_service.clone()).analyze(&image()).await;
    let fenced_result = AnalysisClient::new(fenced_service).analyze(&image()).await;

    assert_eq!(bare_result.status(), AnalysisStatus::Success);
    assert_eq!(bare_result.status(), fenced_result.status());
    assert_eq!(bare_result.counts(), fenced_result.counts());
    assert_eq!(bare_result.counts(), Some(&GenderCounts::new(2, 1, 0)));
    assert_eq!(fenced_result.raw(), Some(fenced.as_str()));
    assert_eq!(bare_service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn analysis_client_tests_malformed_reply_is_parse_error() {
    let service = ScriptedService::new(Ok("faces: lots"));
    let result = AnalysisClient::new(service).analyze(&image()).await;

    assert_eq!(result.status(), AnalysisStatus::Error);
    assert_eq!(result.message(), Some(MESSAGE_PARSE_FAILURE));
    assert_eq!(result.raw(), Some("faces: lots"));
    assert!(result.counts().is_none());
}

#[tokio::test]
async fn analysis_client_tests_translates_service_failures() {
    let cases = [
        (
            ServiceError::InvalidCredentials("bad key".to_string()),
            AnalysisStatus::CredentialMissing,
            MESSAGE_INVALID_KEY,
        ),
        (
            ServiceError::Transport("API key not valid".to_string()),
            AnalysisStatus::CredentialMissing,
            MESSAGE_INVALID_KEY,
        ),
        (
            ServiceError::QuotaExhausted("slow down".to_string()),
            AnalysisStatus::Error,
            MESSAGE_QUOTA_EXCEEDED,
        ),
        (
            ServiceError::Status {
                status: 503,
                message: "unavailable".to_string(),
                body: Some("{\"error\":{}}".to_string()),
            },
            AnalysisStatus::Error,
            MESSAGE_SERVICE_FAILURE,
        ),
        (
            ServiceError::EmptyReply,
            AnalysisStatus::Error,
            MESSAGE_SERVICE_FAILURE,
        ),
    ];

    for (error, status, message) in cases {
        let service = ScriptedService::new(Err(error.clone()));
        let result = AnalysisClient::new(service.clone()).analyze(&image()).await;
        assert_eq!(result.status(), status, "error: {error:?}");
        assert_eq!(result.message(), Some(message));
        assert_eq!(result.raw(), error.body());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1, "no retries expected");
    }
}
