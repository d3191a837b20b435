#![warn(missing_docs)]
//! # gender-lens-session
//!
//! ## Purpose
//! Holds the per-session state of both analysis channels and projects it
//! into display-ready views.
//!
//! ## Responsibilities
//! - Own credential availability, the live channel and the upload channel.
//! - Project each channel's result into a [`ChannelView`] with a label, tone,
//!   and count summary.
//!
//! ## Data flow
//! Driver commands and events mutate [`SessionState`]; renderers read
//! [`SessionState::snapshot`].
//!
//! ## Ownership and lifetimes
//! Snapshots own all of their strings so they can cross task boundaries.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Invalid
//! transitions are refused by the channel state machines.
//!
//! ## Security and privacy notes
//! Views exclude image bytes and raw service replies.

use gender_lens_capture::{LiveChannel, LivePhase};
use gender_lens_core::{
    AnalysisResult, AnalysisStatus, Channel, CredentialAvailability, GenderCounts,
};
use gender_lens_upload::{UploadChannel, UploadPhase};
use serde::Serialize;

/// Visual emphasis for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusTone {
    /// Definitive success.
    Positive,
    /// Partial or indeterminate content.
    Warning,
    /// Nothing to report.
    Notice,
    /// Attempt in flight.
    Busy,
    /// Failure of any kind.
    Failure,
    /// Resting state.
    Muted,
}

impl StatusTone {
    /// Tone for a status.
    pub fn for_status(status: AnalysisStatus) -> Self {
        match status {
            AnalysisStatus::Success => Self::Positive,
            AnalysisStatus::PartialDetection | AnalysisStatus::AllIndeterminate => Self::Warning,
            AnalysisStatus::NoFaceDetected => Self::Notice,
            AnalysisStatus::Detecting => Self::Busy,
            AnalysisStatus::Error
            | AnalysisStatus::SourceError
            | AnalysisStatus::CredentialMissing => Self::Failure,
            AnalysisStatus::Idle => Self::Muted,
        }
    }
}

/// Display projection of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    /// Channel being described.
    pub channel: Channel,
    /// Current status.
    pub status: AnalysisStatus,
    /// Fixed label for the status.
    pub label: &'static str,
    /// Visual emphasis.
    pub tone: StatusTone,
    /// Explanatory message, if any.
    pub message: Option<String>,
    /// Non-zero counts, e.g. `male 2 | female 1`.
    pub counts_summary: Option<String>,
    /// Whether an attempt is in flight.
    pub processing: bool,
}

impl ChannelView {
    /// Projects one channel result.
    pub fn project(channel: Channel, result: &AnalysisResult, processing: bool) -> Self {
        let status = result.status();
        Self {
            channel,
            status,
            label: status.label(),
            tone: StatusTone::for_status(status),
            message: result.message().map(str::to_string),
            counts_summary: result.counts().and_then(counts_summary),
            processing,
        }
    }

    /// One-line rendering used by text front ends.
    pub fn status_line(&self) -> String {
        let mut line = format!("[{}] {}", self.channel.as_str(), self.label);
        if let Some(summary) = &self.counts_summary {
            line.push_str(" (");
            line.push_str(summary);
            line.push(')');
        }
        if let Some(message) = &self.message {
            line.push_str(" - ");
            line.push_str(message);
        }
        line
    }
}

/// Joins the non-zero counts; `None` when every count is zero.
pub fn counts_summary(counts: &GenderCounts) -> Option<String> {
    let parts: Vec<String> = [
        ("male", counts.male),
        ("female", counts.female),
        ("indeterminate", counts.indeterminate),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(name, count)| format!("{name} {count}"))
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Point-in-time projection of the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Credential availability fixed at startup.
    pub credentials: CredentialAvailability,
    /// Live channel view.
    pub live: ChannelView,
    /// Whether the live channel is switched on.
    pub live_enabled: bool,
    /// Live lifecycle phase.
    pub live_phase: LivePhase,
    /// Upload channel view.
    pub upload: ChannelView,
    /// Upload lifecycle phase.
    pub upload_phase: UploadPhase,
    /// Local validation error of the last upload submission.
    pub upload_validation_error: Option<String>,
}

/// Aggregate session state.
#[derive(Debug, Clone)]
pub struct SessionState {
    credentials: CredentialAvailability,
    live: LiveChannel,
    upload: UploadChannel,
}

impl SessionState {
    /// Creates both channels from the startup credential availability.
    pub fn new(credentials: CredentialAvailability) -> Self {
        Self {
            credentials,
            live: LiveChannel::new(credentials),
            upload: UploadChannel::new(credentials),
        }
    }

    /// Credential availability.
    pub fn credentials(&self) -> CredentialAvailability {
        self.credentials
    }

    /// Live channel.
    pub fn live(&self) -> &LiveChannel {
        &self.live
    }

    /// Mutable live channel.
    pub fn live_mut(&mut self) -> &mut LiveChannel {
        &mut self.live
    }

    /// Upload channel.
    pub fn upload(&self) -> &UploadChannel {
        &self.upload
    }

    /// Mutable upload channel.
    pub fn upload_mut(&mut self) -> &mut UploadChannel {
        &mut self.upload
    }

    /// Projects the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            credentials: self.credentials,
            live: ChannelView::project(Channel::Live, self.live.result(), self.live.is_busy()),
            live_enabled: self.live.is_enabled(),
            live_phase: self.live.phase(),
            upload: ChannelView::project(
                Channel::Upload,
                self.upload.result(),
                self.upload.is_processing(),
            ),
            upload_phase: self.upload.phase(),
            upload_validation_error: self.upload.validation_error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for session projection.

    use super::*;

    #[test]
    fn missing_credentials_show_on_both_channels() {
        let state = SessionState::new(CredentialAvailability::Missing);
        let snapshot = state.snapshot();

        for view in [&snapshot.live, &snapshot.upload] {
            assert_eq!(view.status, AnalysisStatus::CredentialMissing);
            assert_eq!(view.tone, StatusTone::Failure);
            assert_eq!(
                view.message.as_deref(),
                Some("Gemini API Key is not configured.")
            );
            assert!(!view.processing);
        }
        assert!(!snapshot.live_enabled);
        assert_eq!(snapshot.live_phase, LivePhase::Inactive);
    }

    #[test]
    fn counts_summary_skips_zero_counts() {
        assert_eq!(
            counts_summary(&GenderCounts::new(2, 1, 0)).as_deref(),
            Some("male 2 | female 1")
        );
        assert_eq!(
            counts_summary(&GenderCounts::new(0, 0, 3)).as_deref(),
            Some("indeterminate 3")
        );
        assert_eq!(counts_summary(&GenderCounts::default()), None);
    }
}
