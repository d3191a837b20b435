#![warn(missing_docs)]
//! # gender-lens-capture
//!
//! ## Purpose
//! Provides media source abstractions and the live channel state machine.
//!
//! ## Responsibilities
//! - Define a backend-agnostic [`MediaSource`] trait.
//! - Expose a directory-backed still source and a deterministic synthetic
//!   source for CI and unit tests.
//! - Hold capture cadence configuration.
//! - Gate live capture attempts through [`LiveChannel`].
//!
//! ## Data flow
//! Channel enabled -> source started -> ready -> timer tick ->
//! [`LiveChannel::begin_attempt`] -> [`MediaSource::capture_still`] ->
//! analysis -> [`LiveChannel::complete_attempt`].
//!
//! ## Ownership and lifetimes
//! Captured stills are owned [`EncodedImage`] values; no borrowed frame
//! memory escapes a source.
//!
//! ## Error model
//! Source start and capture failures are reported as [`SourceError`]; channel
//! transitions never fail and report their decision through return values.
//!
//! ## Security and privacy notes
//! Sources must not persist captured stills.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gender_lens_core::EncodedImage;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

mod live;

pub use live::{
    Completion, EnableOutcome, LiveChannel, LivePhase, LiveTicket, MESSAGE_CAMERA_DISABLED,
    MESSAGE_CAPTURE_FAILED, MESSAGE_SOURCE_UNAVAILABLE,
};

/// Default interval between live capture ticks.
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 7_000;

/// Capture cadence used by the live ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    interval_ms: u64,
}

impl CaptureConfig {
    /// Creates validated capture configuration.
    ///
    /// # Errors
    /// Returns [`SourceError::InvalidInterval`] when `interval_ms == 0`.
    pub fn new(interval_ms: u64) -> Result<Self, SourceError> {
        if interval_ms == 0 {
            return Err(SourceError::InvalidInterval);
        }
        Ok(Self { interval_ms })
    }

    /// Interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
        }
    }
}

/// Live media source seam.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquires the source. Resolving `Ok` signals readiness.
    ///
    /// # Errors
    /// Returns [`SourceError::PermissionDenied`] or
    /// [`SourceError::DeviceUnavailable`] when the source cannot be acquired.
    async fn start(&self) -> Result<(), SourceError>;

    /// Releases the source. Idempotent.
    fn stop(&self);

    /// Produces one encoded still from the running source.
    ///
    /// # Errors
    /// Returns [`SourceError::NotStarted`] before a successful start.
    /// [`SourceError::PermissionDenied`] or [`SourceError::DeviceUnavailable`]
    /// mean the source was lost; encode/device errors affect one still only.
    async fn capture_still(&self) -> Result<EncodedImage, SourceError>;
}

/// Rotates through the image files of one directory, one file per still.
#[derive(Debug)]
pub struct DirectoryStillSource {
    directory: PathBuf,
    frames: Mutex<FrameCursor>,
    started: AtomicBool,
}

#[derive(Debug, Default)]
struct FrameCursor {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirectoryStillSource {
    /// Creates a source over `directory`; nothing is read until [`MediaSource::start`].
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            frames: Mutex::new(FrameCursor::default()),
            started: AtomicBool::new(false),
        }
    }

    /// Directory this source reads from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl MediaSource for DirectoryStillSource {
    async fn start(&self) -> Result<(), SourceError> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|error| io_source_error(&self.directory, &error))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| io_source_error(&self.directory, &error))?
        {
            let path = entry.path();
            if ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(SourceError::DeviceUnavailable(format!(
                "no image files in {}",
                self.directory.display()
            )));
        }
        paths.sort();

        let mut frames = self
            .frames
            .lock()
            .map_err(|_| SourceError::Device("frame cursor lock poisoned".to_string()))?;
        tracing::info!(
            stage = "source",
            action = "started",
            directory = %self.directory.display(),
            files = paths.len(),
            "directory still source ready"
        );
        *frames = FrameCursor { paths, next: 0 };
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        if let Ok(mut frames) = self.frames.lock() {
            *frames = FrameCursor::default();
        }
    }

    async fn capture_still(&self) -> Result<EncodedImage, SourceError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SourceError::NotStarted);
        }

        let path = {
            let mut frames = self
                .frames
                .lock()
                .map_err(|_| SourceError::Device("frame cursor lock poisoned".to_string()))?;
            if frames.paths.is_empty() {
                return Err(SourceError::NotStarted);
            }
            let index = frames.next % frames.paths.len();
            frames.next = index + 1;
            frames.paths[index].clone()
        };

        let format = ImageFormat::from_path(&path)
            .map_err(|error| SourceError::Encode(format!("{}: {error}", path.display())))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|error| io_source_error(&path, &error))?;

        EncodedImage::new(format.to_mime_type(), bytes)
            .map_err(|error| SourceError::Encode(error.to_string()))
    }
}

fn io_source_error(path: &Path, error: &std::io::Error) -> SourceError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            SourceError::PermissionDenied(path.display().to_string())
        }
        _ => SourceError::DeviceUnavailable(format!("{}: {error}", path.display())),
    }
}

/// Deterministic synthetic source for test and CI usage.
#[derive(Debug)]
pub struct SyntheticMediaSource {
    width: u32,
    height: u32,
    start_failure: Option<SourceError>,
    started: AtomicBool,
    sequence: Mutex<u64>,
}

impl SyntheticMediaSource {
    /// Creates a source producing 8x8 JPEG stills.
    pub fn new() -> Self {
        Self::with_size(8, 8)
    }

    /// Creates a source producing stills of the given size.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            start_failure: None,
            started: AtomicBool::new(false),
            sequence: Mutex::new(0),
        }
    }

    /// Makes every [`MediaSource::start`] fail with `error`.
    pub fn failing_with(error: SourceError) -> Self {
        Self {
            start_failure: Some(error),
            ..Self::new()
        }
    }

    /// Returns `true` while the source is started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn start(&self) -> Result<(), SourceError> {
        if let Some(error) = &self.start_failure {
            return Err(error.clone());
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    async fn capture_still(&self) -> Result<EncodedImage, SourceError> {
        if !self.is_started() {
            return Err(SourceError::NotStarted);
        }

        let mut sequence = self
            .sequence
            .lock()
            .map_err(|_| SourceError::Device("synthetic sequence lock poisoned".to_string()))?;
        *sequence += 1;

        let shade = (*sequence % 255) as u8;
        let frame = RgbImage::from_pixel(self.width, self.height, Rgb([shade, 0, 255 - shade]));
        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(frame)
            .write_to(&mut encoded, ImageFormat::Jpeg)
            .map_err(|error| SourceError::Encode(error.to_string()))?;

        EncodedImage::new("image/jpeg", encoded.into_inner())
            .map_err(|error| SourceError::Encode(error.to_string()))
    }
}

/// Capture layer error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Capture interval must be positive.
    #[error("invalid capture interval: must be greater than zero")]
    InvalidInterval,
    /// Access to the source was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Source is missing or busy.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Still requested before a successful start.
    #[error("source is not started")]
    NotStarted,
    /// Runtime device failure.
    #[error("device failure: {0}")]
    Device(String),
    /// Still could not be encoded.
    #[error("still encoding failed: {0}")]
    Encode(String),
}

impl SourceError {
    /// Whether the error means the running source is gone, not just one still.
    pub fn is_source_lost(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::DeviceUnavailable(_))
    }
}
