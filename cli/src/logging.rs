//! Logging setup for the relay binary.
//!
//! Every engine event is appended to the log file as
//! `timestamp LEVEL target: message fields`. Warnings and errors are echoed on
//! stderr so an operator watching the console sees failures; routine progress
//! is narrated by `ConsoleProgress` instead.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default filter when `RUST_LOG` is not provided.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global tracing subscriber.
///
/// # Errors
/// Returns a message if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(log_file: &Path) -> Result<(), String> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| format!("Cannot open log file {}: {}", log_file.display(), e))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| format!("Failed to install tracing subscriber: {}", e))
}
