#![warn(missing_docs)]
//! # gender-lens binary
//!
//! Headless entry point: runs one session, analyzes the image paths given as
//! arguments, and prints channel status lines until Ctrl-C.

use std::path::PathBuf;

use gender_lens_app::{
    AppConfig, AppError, SessionHandle, SessionOptions, app_version, build_client, build_source,
    redact_sensitive, spawn_session,
};
use gender_lens_session::SessionSnapshot;
use gender_lens_upload::UploadRequest;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,gender_lens=debug,reqwest=warn,hyper=warn";

/// CLI entry point.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!(
            "failed to run gender-lens: {}",
            redact_sensitive(&error.to_string())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let uploads: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, uploads))
}

async fn serve(config: AppConfig, uploads: Vec<PathBuf>) -> Result<(), AppError> {
    tracing::info!(
        stage = "startup",
        action = "version",
        version = app_version(),
        camera_enabled = config.camera_enabled,
        "gender-lens starting"
    );

    let client = build_client(&config)?;
    let (handle, driver) = spawn_session(SessionOptions {
        client,
        source: build_source(&config),
        capture: config.capture,
        live_enabled_at_start: config.camera_enabled,
    });
    let printer = tokio::spawn(print_updates(handle.subscribe()));

    let session = async {
        analyze_uploads(&handle, uploads).await?;
        std::future::pending::<Result<(), AppError>>().await
    };
    tokio::select! {
        result = session => result?,
        signal = tokio::signal::ctrl_c() => signal?,
    }

    tracing::info!(stage = "shutdown", action = "signal", "stopping session");
    handle.shutdown()?;
    if let Err(error) = driver.await {
        tracing::error!(stage = "shutdown", action = "driver_join", "{error}");
    }
    printer.abort();
    Ok(())
}

async fn analyze_uploads(handle: &SessionHandle, uploads: Vec<PathBuf>) -> Result<(), AppError> {
    for path in uploads {
        handle.submit_upload(UploadRequest::from_path(path))?;
        handle.snapshot().await?;
        handle
            .wait_for(|snapshot| !snapshot.upload.processing)
            .await?;
    }
    Ok(())
}

async fn print_updates(mut updates: watch::Receiver<SessionSnapshot>) {
    let mut previous: Option<SessionSnapshot> = None;
    loop {
        let current = updates.borrow_and_update().clone();
        print_changes(previous.as_ref(), &current);
        previous = Some(current);

        if updates.changed().await.is_err() {
            break;
        }
    }
}

fn print_changes(previous: Option<&SessionSnapshot>, current: &SessionSnapshot) {
    let views = [
        (previous.map(|snapshot| &snapshot.live), &current.live),
        (previous.map(|snapshot| &snapshot.upload), &current.upload),
    ];
    for (before, after) in views {
        if before != Some(after) {
            println!("{}", after.status_line());
        }
    }

    let previous_error = previous.and_then(|snapshot| snapshot.upload_validation_error.as_deref());
    if current.upload_validation_error.as_deref() != previous_error {
        if let Some(error) = &current.upload_validation_error {
            println!("[upload] {error}");
        }
    }
}
