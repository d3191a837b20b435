#![warn(missing_docs)]
//! # gender-lens-app
//!
//! ## Purpose
//! Wires configuration, the analysis client, the media source, and the session
//! driver into a runnable `gender-lens` process.
//!
//! ## Responsibilities
//! - Read environment configuration through an injectable lookup.
//! - Build the Gemini-backed client when a key is present.
//! - Pick the live media source.
//! - Run the session driver and its periodic ticker.
//! - Provide log redaction for top-level error output.
//!
//! ## Data flow
//! Env -> [`AppConfig`] -> [`build_client`] + [`build_source`] ->
//! [`spawn_session`] -> [`SessionHandle`] commands -> published
//! [`gender_lens_session::SessionSnapshot`] values.
//!
//! ## Ownership and lifetimes
//! The driver task owns all session state; callers interact through cloned
//! [`SessionHandle`] values and owned snapshots.
//!
//! ## Error model
//! Startup failures are [`AppError`]; per-attempt failures never surface here
//! and are reported as channel results instead.
//!
//! ## Security and privacy notes
//! - The API key is read once and never logged.
//! - Kill-switch env var keeps the camera off at startup.
//! - [`redact_sensitive`] strips credential markers from printed errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gender_lens_capture::{
    CaptureConfig, DEFAULT_CAPTURE_INTERVAL_MS, DirectoryStillSource, MediaSource, SourceError,
    SyntheticMediaSource,
};
use gender_lens_client::gemini::DEFAULT_REQUEST_TIMEOUT;
use gender_lens_client::{AnalysisClient, ApiKey, ClientError, GeminiConfig, GeminiService};
use thiserror::Error;

pub mod driver;
pub mod ticker;

pub use driver::{
    MESSAGE_ATTEMPT_ABORTED, SessionCommand, SessionHandle, SessionOptions, spawn_session,
};
pub use ticker::PeriodicTicker;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("GENDER_LENS_VERSION");

/// Primary API key variable.
pub const ENV_API_KEY: &str = "GENDER_LENS_API_KEY";
/// Fallback API key variable.
pub const ENV_API_KEY_FALLBACK: &str = "API_KEY";
/// Live capture interval in milliseconds.
pub const ENV_CAPTURE_INTERVAL_MS: &str = "GENDER_LENS_CAPTURE_INTERVAL_MS";
/// Camera kill-switch.
pub const ENV_CAMERA_ENABLED: &str = "GENDER_LENS_CAMERA_ENABLED";
/// Model override.
pub const ENV_MODEL: &str = "GENDER_LENS_MODEL";
/// Endpoint override.
pub const ENV_ENDPOINT: &str = "GENDER_LENS_ENDPOINT";
/// Per-request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "GENDER_LENS_REQUEST_TIMEOUT_SECS";
/// Directory of stills used as the live source.
pub const ENV_LIVE_SOURCE_DIR: &str = "GENDER_LENS_LIVE_SOURCE_DIR";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Service key; `None` disables analysis for the session.
    pub api_key: Option<ApiKey>,
    /// Live capture cadence.
    pub capture: CaptureConfig,
    /// Whether the camera is switched on at startup.
    pub camera_enabled: bool,
    /// Gemini connection settings.
    pub gemini: GeminiConfig,
    /// Directory source for live stills; synthetic stills when `None`.
    pub live_source_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    /// See [`AppConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidNumber`] for unparsable numeric values
    /// and [`ConfigError::InvalidCapture`] for a zero interval.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .and_then(ApiKey::new)
            .or_else(|| lookup(ENV_API_KEY_FALLBACK).and_then(ApiKey::new));

        let interval_ms =
            parse_number(&lookup, ENV_CAPTURE_INTERVAL_MS)?.unwrap_or(DEFAULT_CAPTURE_INTERVAL_MS);
        let capture = CaptureConfig::new(interval_ms)?;

        let mut gemini = GeminiConfig::default();
        if let Some(model) = non_blank(lookup(ENV_MODEL)) {
            gemini.model = model;
        }
        if let Some(endpoint) = non_blank(lookup(ENV_ENDPOINT)) {
            gemini.endpoint = endpoint;
        }
        gemini.request_timeout = match parse_number(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            Some(0) | None => DEFAULT_REQUEST_TIMEOUT,
            Some(seconds) => Duration::from_secs(seconds),
        };

        Ok(Self {
            api_key,
            capture,
            camera_enabled: flag_enabled(lookup(ENV_CAMERA_ENABLED).as_deref()),
            gemini,
            live_source_dir: non_blank(lookup(ENV_LIVE_SOURCE_DIR)).map(PathBuf::from),
        })
    }
}

fn parse_number<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_blank(lookup(name)) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(None),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Kill-switch semantics.
///
/// - Unset => enabled.
/// - `0`, `false`, `off` (case-insensitive) => disabled.
/// - Any other value => enabled.
pub fn flag_enabled(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

/// Builds the analysis client; unconfigured when no key is set.
///
/// # Errors
/// Returns [`AppError::Client`] when the Gemini settings are invalid.
pub fn build_client(config: &AppConfig) -> Result<AnalysisClient, AppError> {
    let Some(api_key) = config.api_key.clone() else {
        return Ok(AnalysisClient::unconfigured());
    };

    let service = GeminiService::new(api_key, &config.gemini)?;
    tracing::info!(
        stage = "config",
        action = "client_ready",
        model = %config.gemini.model,
        url = %service.url(),
        "gemini service configured"
    );
    Ok(AnalysisClient::new(Arc::new(service)))
}

/// Picks the live source: a still directory when configured, synthetic otherwise.
pub fn build_source(config: &AppConfig) -> Arc<dyn MediaSource> {
    match &config.live_source_dir {
        Some(directory) => Arc::new(DirectoryStillSource::new(directory)),
        None => Arc::new(SyntheticMediaSource::new()),
    }
}

/// Redacts common secret markers in log-safe output.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["bearer", "x-goog-api-key", "api_key", "key", "authorization"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(offset) = lower[cursor..].find(key) {
        let marker_end = cursor + offset + key.len();
        let rest = &input[marker_end..];
        let separator_len: usize = rest
            .chars()
            .take_while(|character| matches!(character, ' ' | '=' | ':'))
            .map(char::len_utf8)
            .sum();
        let separator = &rest[..separator_len];
        let assigns = separator.contains(['=', ':']) || (key == "bearer" && separator_len > 0);

        if !assigns {
            output.push_str(&input[cursor..marker_end]);
            cursor = marker_end;
            continue;
        };

        let value_start = marker_end + separator_len;
        let value_len = input[value_start..]
            .find(|character: char| {
                character.is_whitespace() || matches!(character, '&' | '"' | '\'' | ',')
            })
            .unwrap_or(input.len() - value_start);

        output.push_str(&input[cursor..value_start]);
        if value_len > 0 && !input[value_start..value_start + value_len].starts_with("<redacted>") {
            output.push_str("<redacted>");
        } else {
            output.push_str(&input[value_start..value_start + value_len]);
        }
        cursor = value_start + value_len;
    }

    output.push_str(&input[cursor..]);
    output
}

/// Configuration error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Numeric variable did not parse.
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
    /// Capture configuration rejected.
    #[error("invalid capture configuration: {0}")]
    InvalidCapture(#[from] SourceError),
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be read.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Analysis client could not be built.
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    /// Runtime or signal setup failed.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    /// Session driver is no longer running.
    #[error("session driver has stopped")]
    SessionClosed,
}
