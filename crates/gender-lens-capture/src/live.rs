//! Live channel state machine.
//!
//! The channel owns the current live result and the busy marker. Every method
//! is a single synchronous transition, so a caller that serializes calls (the
//! session driver) gets an atomic check-and-set busy-guard.

use gender_lens_core::{AnalysisResult, AnalysisStatus, CredentialAvailability};

/// Result message after the camera is switched off.
pub const MESSAGE_CAMERA_DISABLED: &str = "Camera is disabled.";
/// Result message when the source cannot be acquired.
pub const MESSAGE_SOURCE_UNAVAILABLE: &str =
    "Could not access camera. Please ensure permissions are granted and no other app is using it.";
/// Result message when a still cannot be taken from a ready source.
pub const MESSAGE_CAPTURE_FAILED: &str = "Failed to capture a frame from the camera.";

const MESSAGE_KEY_NOT_CONFIGURED: &str = "Gemini API Key is not configured.";

/// Lifecycle phase of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivePhase {
    /// Channel disabled; source released.
    Inactive,
    /// Source start requested, not yet ready.
    Initializing,
    /// Source ready; a tick may start an attempt.
    Ready,
    /// One attempt is in flight.
    Detecting,
    /// Source could not be acquired or failed while running.
    SourceError,
}

/// Identity of one live attempt.
///
/// `generation` changes on every enable/disable; `attempt` increases for every
/// attempt within the channel's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTicket {
    /// Channel generation the attempt was started in.
    pub generation: u64,
    /// Monotonic attempt number.
    pub attempt: u64,
}

/// Decision returned by [`LiveChannel::enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// Caller must start the source and report back with this generation.
    StartSource {
        /// Generation to echo in readiness callbacks.
        generation: u64,
    },
    /// Channel was already enabled; nothing to do.
    AlreadyEnabled,
    /// Credentials are missing or were rejected; the source must not start.
    Blocked,
}

/// Decision returned by [`LiveChannel::complete_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Result was written to the channel.
    Applied,
    /// Result was written and latched the channel after a credential failure.
    AppliedFatal,
    /// Ticket no longer matches the in-flight attempt; result discarded.
    Stale,
}

/// Per-session live channel.
#[derive(Debug, Clone)]
pub struct LiveChannel {
    credentials: CredentialAvailability,
    enabled: bool,
    phase: LivePhase,
    generation: u64,
    next_attempt: u64,
    in_flight: Option<LiveTicket>,
    credential_rejected: bool,
    source_error: Option<String>,
    result: AnalysisResult,
}

impl LiveChannel {
    /// Creates a disabled channel. Missing credentials show immediately.
    pub fn new(credentials: CredentialAvailability) -> Self {
        let result = if credentials.is_available() {
            AnalysisResult::idle()
        } else {
            AnalysisResult::credential_missing(MESSAGE_KEY_NOT_CONFIGURED)
        };

        Self {
            credentials,
            enabled: false,
            phase: LivePhase::Inactive,
            generation: 0,
            next_attempt: 0,
            in_flight: None,
            credential_rejected: false,
            source_error: None,
            result,
        }
    }

    /// Requests activation.
    pub fn enable(&mut self) -> EnableOutcome {
        if !self.credentials.is_available() || self.credential_rejected {
            return EnableOutcome::Blocked;
        }
        if self.enabled {
            return EnableOutcome::AlreadyEnabled;
        }

        self.enabled = true;
        self.generation += 1;
        self.phase = LivePhase::Initializing;
        self.in_flight = None;
        self.source_error = None;
        self.result = AnalysisResult::idle();
        EnableOutcome::StartSource {
            generation: self.generation,
        }
    }

    /// Deactivates the channel. Returns `true` when a source was held and must
    /// be released.
    ///
    /// An in-flight attempt is not awaited; its completion will be [`Completion::Stale`].
    pub fn disable(&mut self) -> bool {
        let held_source = self.enabled;
        self.enabled = false;
        self.generation += 1;
        self.phase = LivePhase::Inactive;
        self.in_flight = None;
        self.source_error = None;
        if self.credentials.is_available() && !self.credential_rejected {
            self.result = AnalysisResult::idle_with_message(MESSAGE_CAMERA_DISABLED);
        }
        held_source
    }

    /// Source readiness callback. Returns `true` when the channel became ready.
    pub fn source_ready(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != LivePhase::Initializing {
            return false;
        }
        self.phase = LivePhase::Ready;
        true
    }

    /// Source failure callback. Returns `true` when the failure was recorded.
    pub fn source_failed(&mut self, generation: u64, detail: impl Into<String>) -> bool {
        if generation != self.generation
            || !matches!(
                self.phase,
                LivePhase::Initializing | LivePhase::Ready | LivePhase::Detecting
            )
        {
            return false;
        }
        self.phase = LivePhase::SourceError;
        self.source_error = Some(detail.into());
        self.result = AnalysisResult::source_error(MESSAGE_SOURCE_UNAVAILABLE);
        true
    }

    /// The source disappeared under an in-flight attempt.
    ///
    /// Releases the busy marker and moves the channel to
    /// [`LivePhase::SourceError`]. Returns `false` for a stale ticket.
    pub fn source_lost(&mut self, ticket: LiveTicket, detail: impl Into<String>) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        self.source_failed(ticket.generation, detail)
    }

    /// Busy-guard: starts an attempt iff enabled, ready, idle, and not latched.
    ///
    /// On success the result becomes `Detecting` and the ticket must be passed
    /// back to [`Self::complete_attempt`].
    pub fn begin_attempt(&mut self) -> Option<LiveTicket> {
        if !self.enabled
            || self.phase != LivePhase::Ready
            || self.in_flight.is_some()
            || self.credential_rejected
        {
            return None;
        }

        self.next_attempt += 1;
        let ticket = LiveTicket {
            generation: self.generation,
            attempt: self.next_attempt,
        };
        self.in_flight = Some(ticket);
        self.phase = LivePhase::Detecting;
        self.result = AnalysisResult::detecting();
        Some(ticket)
    }

    /// Writes an attempt's terminal result and releases the busy marker.
    ///
    /// Results from a ticket that is not the current in-flight attempt are
    /// discarded, so a stale attempt cannot overwrite a newer result. A
    /// credential failure latches the channel and switches it off.
    pub fn complete_attempt(&mut self, ticket: LiveTicket, result: AnalysisResult) -> Completion {
        if self.in_flight != Some(ticket) {
            return Completion::Stale;
        }
        self.in_flight = None;

        if self.phase != LivePhase::Detecting {
            return Completion::Stale;
        }
        self.phase = LivePhase::Ready;

        let fatal = result.status() == AnalysisStatus::CredentialMissing;
        self.result = result;
        if fatal {
            self.credential_rejected = true;
            self.enabled = false;
            self.generation += 1;
            self.phase = LivePhase::Inactive;
            Completion::AppliedFatal
        } else {
            Completion::Applied
        }
    }

    /// Current result.
    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    /// Current phase.
    pub fn phase(&self) -> LivePhase {
        self.phase
    }

    /// Whether the user has the channel switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an attempt is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Low-level source failure detail, kept apart from the user message.
    pub fn source_error(&self) -> Option<&str> {
        self.source_error.as_deref()
    }

    /// Whether a credential failure latched the channel for this session.
    pub fn is_latched(&self) -> bool {
        self.credential_rejected
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for live channel transitions.

    use super::*;

    fn ready_channel() -> (LiveChannel, u64) {
        let mut channel = LiveChannel::new(CredentialAvailability::Available);
        let EnableOutcome::StartSource { generation } = channel.enable() else {
            panic!("enable should request a source start");
        };
        assert!(channel.source_ready(generation));
        (channel, generation)
    }

    #[test]
    fn busy_guard_blocks_second_attempt() {
        let (mut channel, _) = ready_channel();
        let ticket = channel.begin_attempt().expect("first attempt should start");
        assert_eq!(channel.result().status(), AnalysisStatus::Detecting);
        assert!(channel.begin_attempt().is_none());

        let outcome = channel.complete_attempt(ticket, AnalysisResult::error("boom"));
        assert_eq!(outcome, Completion::Applied);
        assert_eq!(channel.phase(), LivePhase::Ready);
        assert!(channel.begin_attempt().is_some());
    }

    #[test]
    fn missing_credentials_block_enable() {
        let mut channel = LiveChannel::new(CredentialAvailability::Missing);
        assert_eq!(channel.enable(), EnableOutcome::Blocked);
        assert!(!channel.disable());
        assert_eq!(channel.result().status(), AnalysisStatus::CredentialMissing);
    }

    #[test]
    fn stale_readiness_is_ignored() {
        let mut channel = LiveChannel::new(CredentialAvailability::Available);
        let EnableOutcome::StartSource { generation } = channel.enable() else {
            panic!("enable should request a source start");
        };
        channel.disable();
        assert!(!channel.source_ready(generation));
        assert!(!channel.source_failed(generation, "late failure"));
        assert_eq!(channel.phase(), LivePhase::Inactive);
    }

    #[test]
    fn credential_failure_latches_channel() {
        let (mut channel, _) = ready_channel();
        let ticket = channel.begin_attempt().expect("attempt should start");
        let outcome =
            channel.complete_attempt(ticket, AnalysisResult::credential_missing("rejected"));
        assert_eq!(outcome, Completion::AppliedFatal);
        assert!(channel.is_latched());
        assert!(!channel.is_enabled());
        assert_eq!(channel.phase(), LivePhase::Inactive);
        assert!(channel.begin_attempt().is_none());

        assert!(!channel.disable());
        assert_eq!(channel.enable(), EnableOutcome::Blocked);
        assert_eq!(channel.result().status(), AnalysisStatus::CredentialMissing);
    }

    #[test]
    fn lost_source_releases_busy_marker() {
        let (mut channel, generation) = ready_channel();
        let ticket = channel.begin_attempt().expect("attempt should start");

        assert!(channel.source_lost(ticket, "device unplugged"));
        assert_eq!(channel.phase(), LivePhase::SourceError);
        assert!(!channel.is_busy());
        assert_eq!(channel.source_error(), Some("device unplugged"));
        assert_eq!(channel.result().status(), AnalysisStatus::SourceError);
        assert_eq!(channel.complete_attempt(ticket, AnalysisResult::error("late")), Completion::Stale);
        assert!(!channel.source_lost(ticket, "again"));
        assert_eq!(channel.generation(), generation);
        assert!(channel.begin_attempt().is_none());
    }
}
