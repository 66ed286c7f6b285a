//! Logging for Odyn processes.
//!
//! [`init`] installs a global `tracing` subscriber writing to a log file,
//! or to stdout when no file is configured or the file cannot be opened.
//! The returned [`Telemetry`] owns the background writer; call
//! [`Telemetry::shutdown`] before exit so buffered lines are flushed.
//!
//! ```ignore
//! let telemetry = odyn_telemetry::init(LogSettings::new("info").with_file(path))?;
//! // ...
//! telemetry.shutdown();
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Error setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {reason}")]
    BadFilter { filter: String, reason: String },
    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

/// What to log and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// Log file, appended to. `None` logs to stdout.
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive, e.g. `info` or `odyn_store=debug,warn`.
    pub filter: String,
}

impl LogSettings {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            file: None,
            filter: filter.into(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Where log lines end up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    File(PathBuf),
    Stdout,
}

impl fmt::Display for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::File(path) => write!(f, "{}", path.display()),
            LogSink::Stdout => f.write_str("stdout"),
        }
    }
}

/// Installed logger. Dropping it also flushes, but without the farewell line.
pub struct Telemetry {
    sink: LogSink,
    guard: WorkerGuard,
}

impl Telemetry {
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Log the final line and flush the writer.
    pub fn shutdown(self) {
        info!("Goodbye");
        drop(self.guard);
    }
}

/// Open the configured sink, falling back to stdout.
///
/// Returns the writer, the sink actually used, and the reason for falling
/// back if there was one.
fn open_sink(file: Option<&Path>) -> (Box<dyn Write + Send>, LogSink, Option<String>) {
    let Some(path) = file else {
        return (Box::new(io::stdout()), LogSink::Stdout, None);
    };
    match open_log_file(path) {
        Ok(f) => (Box::new(f), LogSink::File(path.to_path_buf()), None),
        Err(e) => (
            Box::new(io::stdout()),
            LogSink::Stdout,
            Some(format!("cannot open {}: {e}", path.display())),
        ),
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber.
///
/// May succeed once per process; later calls return
/// [`TelemetryError::AlreadyInitialized`].
pub fn init(settings: LogSettings) -> Result<Telemetry, TelemetryError> {
    let filter = EnvFilter::try_new(&settings.filter).map_err(|e| TelemetryError::BadFilter {
        filter: settings.filter.clone(),
        reason: e.to_string(),
    })?;

    let (writer, sink, fallback) = open_sink(settings.file.as_deref());
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(sink == LogSink::Stdout),
        )
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)?;

    if let Some(reason) = fallback {
        warn!(%reason, "log file unavailable, logging to stdout");
    }
    info!(%sink, "logging started");
    Ok(Telemetry { sink, guard })
}

// ============================================================================
// Tests
// ============================================================================
