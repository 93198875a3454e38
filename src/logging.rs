//! Console and file logging.
//!
//! Besides the pretty console output, everything is written to
//! `<log_dir>/combined.log` and errors alone to `<log_dir>/error.log`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

pub const COMBINED_LOG: &str = "combined.log";
pub const ERROR_LOG: &str = "error.log";

/// Keeps the file writers alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _combined: WorkerGuard,
    _errors: WorkerGuard,
}

/// Respect RUST_LOG if set, default to info for our crate and warn for deps.
fn env_filter() -> EnvFilter {
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,h2=warn",
        env!("CARGO_PKG_NAME")
    );
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(default_filter))
}

pub fn init(log_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let (combined, combined_guard) =
        tracing_appender::non_blocking(file_appender(log_dir, COMBINED_LOG)?);
    let (errors, errors_guard) = tracing_appender::non_blocking(file_appender(log_dir, ERROR_LOG)?);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().pretty().with_target(false).with_level(true))
        .with(fmt::layer().with_writer(combined).with_ansi(false))
        .with(
            fmt::layer()
                .with_writer(errors)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .with(ErrorLayer::default())
        .init();

    tracing::debug!(log_dir = %log_dir.display(), "file logging initialized");
    Ok(LoggingGuard {
        _combined: combined_guard,
        _errors: errors_guard,
    })
}

fn file_appender(log_dir: &Path, file_name: &str) -> anyhow::Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(log_dir)
        .with_context(|| format!("failed to open {} in {}", file_name, log_dir.display()))
}
