//! Integration tests for the directory-backed still source.

use gender_lens_capture::{DirectoryStillSource, MediaSource, SourceError};

#[tokio::test]
async fn directory_source_tests_rotates_through_image_files() {
    let directory = tempfile::tempdir().expect("temp dir should be created");
    std::fs::write(directory.path().join("a.png"), b"first").expect("fixture should write");
    std::fs::write(directory.path().join("b.jpg"), b"second").expect("fixture should write");
    std::fs::write(directory.path().join("notes.txt"), b"skip me").expect("fixture should write");

    let source = DirectoryStillSource::new(directory.path());
    assert_eq!(source.capture_still().await, Err(SourceError::NotStarted));
    source.start().await.expect("start should succeed");

    let first = source.capture_still().await.expect("first still");
    let second = source.capture_still().await.expect("second still");
    let third = source.capture_still().await.expect("third still");
    assert_eq!(first.mime_type(), "image/png");
    assert_eq!(first.bytes(), b"first");
    assert_eq!(second.mime_type(), "image/jpeg");
    assert_eq!(third.bytes(), b"first");

    source.stop();
    assert_eq!(source.capture_still().await, Err(SourceError::NotStarted));
}

#[tokio::test]
async fn directory_source_tests_missing_or_empty_directory_is_unavailable() {
    let directory = tempfile::tempdir().expect("temp dir should be created");
    let empty = DirectoryStillSource::new(directory.path());
    assert!(matches!(
        empty.start().await,
        Err(SourceError::DeviceUnavailable(_))
    ));

    let missing = DirectoryStillSource::new(directory.path().join("nope"));
    assert!(matches!(
        missing.start().await,
        Err(SourceError::DeviceUnavailable(_))
    ));
}

#[tokio::test]
async fn directory_source_tests_vanished_file_reports_lost_source() {
    let directory = tempfile::tempdir().expect("temp dir should be created");
    let path = directory.path().join("only.png");
    std::fs::write(&path, b"frame").expect("fixture should write");

    let source = DirectoryStillSource::new(directory.path());
    source.start().await.expect("start should succeed");
    std::fs::remove_file(&path).expect("fixture should be removed");

    let error = source.capture_still().await.expect_err("capture should fail");
    assert!(matches!(error, SourceError::DeviceUnavailable(_)));
    assert!(error.is_source_lost());
}
