//! Tests the ordered classifier rules on representative payloads.

use gender_lens_core::{
    AnalysisStatus, ClassificationPayload, GenderCounts, MESSAGE_ALL_INDETERMINATE,
    MESSAGE_NO_FACE_CLASSIFIED, MESSAGE_PARTIAL_DETECTION, MESSAGE_SUCCESS, classify,
};

#[test]
fn classifier_rules_tests_zero_total_is_no_face() {
    let result = classify(&ClassificationPayload::counts(0, 0, 0));
    assert_eq!(result.status(), AnalysisStatus::NoFaceDetected);
    assert_eq!(result.message(), Some(MESSAGE_NO_FACE_CLASSIFIED));
    assert_eq!(result.counts(), Some(&GenderCounts::default()));
}

#[test]
fn classifier_rules_tests_determinate_faces_succeed() {
    let result = classify(&ClassificationPayload::counts(2, 1, 0));
    assert_eq!(result.status(), AnalysisStatus::Success);
    assert_eq!(result.message(), Some(MESSAGE_SUCCESS));
    assert_eq!(result.counts(), Some(&GenderCounts::new(2, 1, 0)));
}

#[test]
fn classifier_rules_tests_mixed_faces_are_partial() {
    let result = classify(&ClassificationPayload::counts(1, 1, 1));
    assert_eq!(result.status(), AnalysisStatus::PartialDetection);
    assert_eq!(result.message(), Some(MESSAGE_PARTIAL_DETECTION));

    let female_only = classify(&ClassificationPayload::counts(0, 4, 2));
    assert_eq!(female_only.status(), AnalysisStatus::PartialDetection);
}

#[test]
fn classifier_rules_tests_only_indeterminate_faces() {
    let result = classify(&ClassificationPayload::counts(0, 0, 3));
    assert_eq!(result.status(), AnalysisStatus::AllIndeterminate);
    assert_eq!(result.message(), Some(MESSAGE_ALL_INDETERMINATE));
}

#[test]
fn classifier_rules_tests_no_face_flag_wins_over_counts() {
    for (male, female, indeterminate) in [(0, 0, 0), (5, 0, 0), (1, 2, 3), (0, 0, 9)] {
        let payload = ClassificationPayload {
            male_count: male,
            female_count: female,
            indeterminate_count: indeterminate,
            no_face_detected: true,
        };
        let result = classify(&payload);
        assert_eq!(result.status(), AnalysisStatus::NoFaceDetected);
        assert_eq!(result.counts().map(GenderCounts::total), Some(0));
    }
}

#[test]
fn classifier_rules_tests_are_deterministic() {
    for male in 0..4 {
        for female in 0..4 {
            for indeterminate in 0..4 {
                for no_face in [false, true] {
                    let payload = ClassificationPayload {
                        male_count: male,
                        female_count: female,
                        indeterminate_count: indeterminate,
                        no_face_detected: no_face,
                    };
                    let first = classify(&payload);
                    assert_eq!(first, classify(&payload));
                    assert!(first.status().is_terminal());
                    assert!(first.message().is_some());
                }
            }
        }
    }
}
