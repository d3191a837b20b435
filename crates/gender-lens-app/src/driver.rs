//! Session driver task.
//!
//! One task owns [`SessionState`] and applies commands and internal events in
//! arrival order, so every channel transition is atomic. Source start, still
//! capture, file reads and remote calls run in spawned tasks that report back
//! through the same queue.

use std::sync::Arc;

use gender_lens_capture::{
    CaptureConfig, Completion, EnableOutcome, LiveTicket, MESSAGE_CAPTURE_FAILED, MediaSource,
    SourceError,
};
use gender_lens_client::{AnalysisClient, MESSAGE_SERVICE_FAILURE};
use gender_lens_core::{AnalysisResult, CredentialAvailability, EncodedImage};
use gender_lens_session::{SessionSnapshot, SessionState};
use gender_lens_upload::{
    SubmitOutcome, UploadError, UploadPipeline, UploadRequest, UploadTicket, read_upload,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::AppError;
use crate::ticker::PeriodicTicker;

/// Live result written when an attempt task dies without reporting.
pub const MESSAGE_ATTEMPT_ABORTED: &str = "An error occurred during camera analysis.";

/// Requests accepted by the session driver.
#[derive(Debug)]
pub enum SessionCommand {
    /// Switches the live channel on or off.
    SetLiveEnabled(bool),
    /// Runs one live tick immediately.
    Tick,
    /// Submits one file to the upload channel.
    SubmitUpload(UploadRequest),
    /// Clears the upload result and validation error.
    ClearUpload,
    /// Replies with the state after every earlier command was applied.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Releases the source and stops the driver.
    Shutdown,
}

#[derive(Debug)]
enum SessionEvent {
    Command(SessionCommand),
    LiveTick {
        generation: u64,
    },
    SourceStarted {
        generation: u64,
        outcome: Result<(), SourceError>,
    },
    LiveCaptureFailed {
        ticket: LiveTicket,
        error: SourceError,
    },
    LiveCompleted {
        ticket: LiveTicket,
        result: AnalysisResult,
    },
    UploadRead {
        ticket: UploadTicket,
        read: Result<EncodedImage, UploadError>,
    },
    UploadCompleted {
        ticket: UploadTicket,
        result: AnalysisResult,
    },
}

/// Everything a session needs at startup.
pub struct SessionOptions {
    /// Analysis client shared by both channels.
    pub client: AnalysisClient,
    /// Live media source.
    pub source: Arc<dyn MediaSource>,
    /// Live capture cadence.
    pub capture: CaptureConfig,
    /// Whether the live channel is switched on at startup.
    pub live_enabled_at_start: bool,
}

/// Cloneable handle to a running session driver.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) -> Result<(), AppError> {
        self.commands
            .send(SessionEvent::Command(command))
            .map_err(|_| AppError::SessionClosed)
    }

    /// Switches the live channel.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] after the driver stopped.
    pub fn set_live_enabled(&self, enabled: bool) -> Result<(), AppError> {
        self.send(SessionCommand::SetLiveEnabled(enabled))
    }

    /// Requests an immediate live tick.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] after the driver stopped.
    pub fn tick(&self) -> Result<(), AppError> {
        self.send(SessionCommand::Tick)
    }

    /// Submits a file to the upload channel.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] after the driver stopped.
    pub fn submit_upload(&self, request: UploadRequest) -> Result<(), AppError> {
        self.send(SessionCommand::SubmitUpload(request))
    }

    /// Clears the upload channel.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] after the driver stopped.
    pub fn clear_upload(&self) -> Result<(), AppError> {
        self.send(SessionCommand::ClearUpload)
    }

    /// Stops the driver.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] when it already stopped.
    pub fn shutdown(&self) -> Result<(), AppError> {
        self.send(SessionCommand::Shutdown)
    }

    /// Snapshot taken after all previously sent commands were applied.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] after the driver stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        response.await.map_err(|_| AppError::SessionClosed)
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified whenever the published snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    /// Returns [`AppError::SessionClosed`] if the driver stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, AppError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| AppError::SessionClosed)?
            .clone();
        Ok(snapshot)
    }
}

/// Spawns the driver task. Must be called inside a tokio runtime.
pub fn spawn_session(options: SessionOptions) -> (SessionHandle, JoinHandle<()>) {
    let credentials = options.client.credentials();
    let state = SessionState::new(credentials);
    let (commands, inbox) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshots) = watch::channel(state.snapshot());

    let mut driver = SessionDriver {
        state,
        uploads: UploadPipeline::new(options.client.clone()),
        client: options.client,
        source: options.source,
        capture: options.capture,
        ticker: None,
        events: commands.downgrade(),
        snapshots: snapshot_tx,
    };

    tracing::info!(
        stage = "session",
        action = "start",
        credentials = ?credentials,
        interval_ms = driver.capture.interval_ms(),
        live_enabled = options.live_enabled_at_start,
        "session driver starting"
    );
    if credentials == CredentialAvailability::Missing {
        tracing::warn!(
            stage = "session",
            action = "credentials_missing",
            "no API key configured; analysis is disabled for this session"
        );
    }

    if options.live_enabled_at_start {
        driver.enable_live();
    } else {
        driver.disable_live();
    }
    driver.publish();

    let task = tokio::spawn(driver.run(inbox));
    (
        SessionHandle {
            commands,
            snapshots,
        },
        task,
    )
}

struct SessionDriver {
    state: SessionState,
    client: AnalysisClient,
    uploads: UploadPipeline,
    source: Arc<dyn MediaSource>,
    capture: CaptureConfig,
    ticker: Option<PeriodicTicker>,
    events: mpsc::WeakUnboundedSender<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionDriver {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = inbox.recv().await {
            let keep_running = self.handle(event);
            self.publish();
            if !keep_running {
                break;
            }
        }

        self.stop_ticker();
        self.source.stop();
        tracing::info!(stage = "session", action = "stopped", "session driver stopped");
    }

    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Command(SessionCommand::SetLiveEnabled(true)) => self.enable_live(),
            SessionEvent::Command(SessionCommand::SetLiveEnabled(false)) => self.disable_live(),
            SessionEvent::Command(SessionCommand::Tick) => self.tick(None),
            SessionEvent::Command(SessionCommand::SubmitUpload(request)) => {
                self.submit_upload(request)
            }
            SessionEvent::Command(SessionCommand::ClearUpload) => {
                self.state.upload_mut().clear();
            }
            SessionEvent::Command(SessionCommand::Snapshot(reply)) => {
                let _ = reply.send(self.state.snapshot());
            }
            SessionEvent::Command(SessionCommand::Shutdown) => return false,
            SessionEvent::LiveTick { generation } => self.tick(Some(generation)),
            SessionEvent::SourceStarted {
                generation,
                outcome,
            } => self.source_started(generation, outcome),
            SessionEvent::LiveCaptureFailed { ticket, error } => {
                self.live_capture_failed(ticket, error)
            }
            SessionEvent::LiveCompleted { ticket, result } => self.live_completed(ticket, result),
            SessionEvent::UploadRead { ticket, read } => self.upload_read(ticket, read),
            SessionEvent::UploadCompleted { ticket, result } => {
                if !self.state.upload_mut().complete(ticket, result) {
                    tracing::debug!(
                        stage = "upload",
                        action = "stale_discarded",
                        ticket = ticket.sequence(),
                        "discarded result of a cleared submission"
                    );
                }
            }
        }
        true
    }

    fn publish(&self) {
        let next = self.state.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn enable_live(&mut self) {
        match self.state.live_mut().enable() {
            EnableOutcome::StartSource { generation } => {
                tracing::info!(
                    stage = "live",
                    action = "enable",
                    generation,
                    "starting media source"
                );
                let Some(events) = self.events.upgrade() else {
                    return;
                };
                let source = Arc::clone(&self.source);
                tokio::spawn(async move {
                    let outcome = source.start().await;
                    let _ = events.send(SessionEvent::SourceStarted {
                        generation,
                        outcome,
                    });
                });
            }
            EnableOutcome::AlreadyEnabled => {
                tracing::debug!(stage = "live", action = "enable", "already enabled");
            }
            EnableOutcome::Blocked => {
                tracing::warn!(
                    stage = "live",
                    action = "enable_blocked",
                    "live channel is blocked by missing or rejected credentials"
                );
            }
        }
    }

    fn disable_live(&mut self) {
        let held_source = self.state.live_mut().disable();
        self.stop_ticker();
        if held_source {
            self.source.stop();
            tracing::info!(stage = "live", action = "disable", "media source released");
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn source_started(&mut self, generation: u64, outcome: Result<(), SourceError>) {
        match outcome {
            Ok(()) => {
                if self.state.live_mut().source_ready(generation) {
                    tracing::info!(
                        stage = "live",
                        action = "source_ready",
                        generation,
                        "media source ready; ticker armed"
                    );
                    self.start_ticker(generation);
                } else if !self.state.live().is_enabled() {
                    self.source.stop();
                }
            }
            Err(error) => {
                if self.state.live_mut().source_failed(generation, error.to_string()) {
                    tracing::error!(
                        stage = "live",
                        action = "source_failed",
                        generation,
                        "{error}"
                    );
                }
            }
        }
    }

    fn start_ticker(&mut self, generation: u64) {
        let events = self.events.clone();
        self.ticker = Some(PeriodicTicker::spawn(self.capture.interval(), move || {
            events
                .upgrade()
                .is_some_and(|events| events.send(SessionEvent::LiveTick { generation }).is_ok())
        }));
    }

    fn tick(&mut self, generation: Option<u64>) {
        let current = self.state.live().generation();
        if generation.is_some_and(|generation| generation != current) {
            return;
        }

        let Some(ticket) = self.state.live_mut().begin_attempt() else {
            tracing::debug!(
                stage = "live",
                action = "tick_skipped",
                busy = self.state.live().is_busy(),
                "live channel not ready for an attempt"
            );
            return;
        };

        let Some(events) = self.events.upgrade() else {
            return;
        };
        tracing::debug!(
            stage = "live",
            action = "attempt",
            generation = ticket.generation,
            attempt = ticket.attempt,
            "live attempt started"
        );
        let client = self.client.clone();
        let source = Arc::clone(&self.source);
        tokio::spawn(async move {
            let guard = CompletionGuard::new(
                events,
                SessionEvent::LiveCompleted {
                    ticket,
                    result: AnalysisResult::error(MESSAGE_ATTEMPT_ABORTED),
                },
            );
            match source.capture_still().await {
                Ok(image) => {
                    let result = client.analyze(&image).await;
                    guard.complete(SessionEvent::LiveCompleted { ticket, result });
                }
                Err(error) => guard.complete(SessionEvent::LiveCaptureFailed { ticket, error }),
            }
        });
    }

    fn live_capture_failed(&mut self, ticket: LiveTicket, error: SourceError) {
        if !error.is_source_lost() {
            tracing::warn!(
                stage = "live",
                action = "capture_failed",
                attempt = ticket.attempt,
                "{error}"
            );
            self.live_completed(ticket, AnalysisResult::error(MESSAGE_CAPTURE_FAILED));
            return;
        }

        if self.state.live_mut().source_lost(ticket, error.to_string()) {
            tracing::error!(
                stage = "live",
                action = "source_lost",
                generation = ticket.generation,
                "{error}"
            );
            self.stop_ticker();
            self.source.stop();
        }
    }

    fn live_completed(&mut self, ticket: LiveTicket, result: AnalysisResult) {
        let status = result.status();
        match self.state.live_mut().complete_attempt(ticket, result) {
            Completion::Applied => {
                tracing::info!(
                    stage = "live",
                    action = "completed",
                    attempt = ticket.attempt,
                    status = status.label(),
                    "live attempt completed"
                );
            }
            Completion::AppliedFatal => {
                tracing::error!(
                    stage = "live",
                    action = "credentials_rejected",
                    attempt = ticket.attempt,
                    "service rejected credentials; live capture stopped for this session"
                );
                self.stop_ticker();
                self.source.stop();
            }
            Completion::Stale => {
                tracing::debug!(
                    stage = "live",
                    action = "stale_discarded",
                    generation = ticket.generation,
                    attempt = ticket.attempt,
                    "discarded result of a superseded attempt"
                );
            }
        }
    }

    fn submit_upload(&mut self, request: UploadRequest) {
        match self.state.upload_mut().submit(&request) {
            SubmitOutcome::Accepted(ticket) => {
                let Some(events) = self.events.upgrade() else {
                    return;
                };
                tracing::info!(
                    stage = "upload",
                    action = "accepted",
                    ticket = ticket.sequence(),
                    path = %request.path.display(),
                    "reading upload"
                );
                tokio::spawn(async move {
                    let read = read_upload(&request.path).await;
                    let _ = events.send(SessionEvent::UploadRead { ticket, read });
                });
            }
            SubmitOutcome::Invalid => {}
            SubmitOutcome::RejectedNoCredentials => {
                tracing::warn!(
                    stage = "upload",
                    action = "rejected",
                    "upload ignored: credentials are missing"
                );
            }
            SubmitOutcome::RejectedBusy => {
                tracing::warn!(
                    stage = "upload",
                    action = "rejected",
                    "upload ignored: another upload is processing"
                );
            }
        }
    }

    fn upload_read(&mut self, ticket: UploadTicket, read: Result<EncodedImage, UploadError>) {
        let image = match read {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(stage = "upload", action = "read_failed", "{error}");
                self.state.upload_mut().image_ready(ticket, Err(&error));
                return;
            }
        };

        if !self.state.upload_mut().image_ready(ticket, Ok(())) {
            return;
        }
        let Some(events) = self.events.upgrade() else {
            return;
        };
        let uploads = self.uploads.clone();
        tokio::spawn(async move {
            let guard = CompletionGuard::new(
                events,
                SessionEvent::UploadCompleted {
                    ticket,
                    result: AnalysisResult::error(MESSAGE_SERVICE_FAILURE),
                },
            );
            let result = uploads.analyze(&image).await;
            guard.complete(SessionEvent::UploadCompleted { ticket, result });
        });
    }
}

/// Sends a fallback completion if the owning task ends without reporting.
struct CompletionGuard {
    events: mpsc::UnboundedSender<SessionEvent>,
    fallback: Option<SessionEvent>,
}

impl CompletionGuard {
    fn new(events: mpsc::UnboundedSender<SessionEvent>, fallback: SessionEvent) -> Self {
        Self {
            events,
            fallback: Some(fallback),
        }
    }

    fn complete(mut self, event: SessionEvent) {
        self.fallback = None;
        let _ = self.events.send(event);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            tracing::error!(
                stage = "session",
                action = "attempt_aborted",
                "attempt task ended without a result"
            );
            let _ = self.events.send(fallback);
        }
    }
}
