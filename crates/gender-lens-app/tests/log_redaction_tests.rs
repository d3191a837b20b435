//! Integration tests for log redaction.

use gender_lens_app::redact_sensitive;

#[test]
fn log_redaction_tests_removes_obvious_secret_markers() {
    let raw = "authorization: Bearer abc123";
    let redacted = redact_sensitive(raw);

    assert!(redacted.contains("<redacted>"));
    assert!(!redacted.contains("abc123"));
}

#[test]
fn log_redaction_tests_strips_api_key_query_and_header_values() {
    let raw = "POST https://example.test/v1beta/models/m:generateContent?key=AIzaSecret failed; \
               x-goog-api-key=AIzaSecret; api_key: AIzaSecret";
    let redacted = redact_sensitive(raw);

    assert!(!redacted.contains("AIzaSecret"));
    assert!(redacted.starts_with("POST https://example.test/v1beta/models/m:generateContent?key="));
}
