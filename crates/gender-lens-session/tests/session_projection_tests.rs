//! Integration tests for session snapshot projection.

use gender_lens_capture::{EnableOutcome, LivePhase};
use gender_lens_core::{
    AnalysisStatus, Channel, ClassificationPayload, CredentialAvailability, classify,
};
use gender_lens_session::{ChannelView, SessionState, StatusTone};
use gender_lens_upload::{SubmitOutcome, UploadRequest};

#[test]
fn session_projection_tests_live_attempt_is_busy_then_positive() {
    let mut state = SessionState::new(CredentialAvailability::Available);
    let EnableOutcome::StartSource { generation } = state.live_mut().enable() else {
        panic!("enable should request a source start");
    };
    state.live_mut().source_ready(generation);
    let ticket = state.live_mut().begin_attempt().expect("attempt should start");

    let busy = state.snapshot();
    assert!(busy.live_enabled);
    assert_eq!(busy.live_phase, LivePhase::Detecting);
    assert_eq!(busy.live.tone, StatusTone::Busy);
    assert!(busy.live.processing);
    assert_eq!(busy.upload.status, AnalysisStatus::Idle);

    let result = classify(&ClassificationPayload::counts(2, 1, 0));
    state.live_mut().complete_attempt(ticket, result);
    let done = state.snapshot();
    assert_eq!(done.live.tone, StatusTone::Positive);
    assert_eq!(done.live.counts_summary.as_deref(), Some("male 2 | female 1"));
    assert_eq!(
        done.live.status_line(),
        "[live] Analysis Complete (male 2 | female 1) - Analysis complete."
    );
}

#[test]
fn session_projection_tests_upload_validation_error_is_separate() {
    let mut state = SessionState::new(CredentialAvailability::Available);
    let outcome = state
        .upload_mut()
        .submit(&UploadRequest::with_content_type("clip.mp4", "video/mp4"));
    assert_eq!(outcome, SubmitOutcome::Invalid);

    let snapshot = state.snapshot();
    assert_eq!(
        snapshot.upload_validation_error.as_deref(),
        Some("Invalid file type. Please upload an image.")
    );
    assert_eq!(snapshot.upload.status, AnalysisStatus::Idle);
    assert_eq!(snapshot.upload.tone, StatusTone::Muted);
    assert_eq!(snapshot.upload.message, None);
}

#[test]
fn session_projection_tests_views_serialize_for_front_ends() {
    let result = classify(&ClassificationPayload::counts(0, 1, 1));
    let view = ChannelView::project(Channel::Upload, &result, false);
    let value = serde_json::to_value(&view).expect("view should serialize");

    assert_eq!(value["channel"], "Upload");
    assert_eq!(value["status"], "PartialDetection");
    assert_eq!(value["tone"], "Warning");
    assert_eq!(value["counts_summary"], "female 1 | indeterminate 1");
    assert_eq!(value["processing"], false);
}
