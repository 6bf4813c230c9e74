//! Observability: logging and metrics initialisation.
//!
//! Services emit metrics through the `metrics` facade. The binary installs
//! a Prometheus recorder when enabled; library users install their own.

mod logging;
mod metrics;

pub use logging::{DEFAULT_FILTER, LogFormat, LoggingConfig, VERBOSE_FILTER};
pub use metrics::{MetricsConfig, MetricsHandle, install_prometheus};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global tracing subscriber.
///
/// Events go to stderr, or are appended to `config.file` when set.
///
/// # Errors
///
/// Returns an error if logging was already initialised, the filter is
/// invalid, or the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(logging_failed("logging already initialized"));
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        Error::InvalidInput(format!("invalid log filter '{}': {e}", config.filter))
    })?;

    tracing_subscriber::registry()
        .with(event_layer(config)?)
        .with(filter)
        .try_init()
        .map_err(logging_failed)?;

    LOGGING_INIT
        .set(())
        .map_err(|()| logging_failed("failed to mark logging initialized"))
}

/// Builds the formatting layer for the configured format and sink.
fn event_layer(config: &LoggingConfig) -> Result<BoxedLayer> {
    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .boxed(),
    };
    Ok(layer)
}

/// Opens the log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}

fn logging_failed(cause: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: cause.to_string(),
    }
}
