//! # Logging Utilities
//!
//! Logging setup for layoutmap binaries using `tracing`.
//!
//! Resolved layouts are written to stdout, so console logs always go to
//! stderr. Output can additionally be mirrored into a file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layoutmap_utils::{init_logging, LoggingConfig};
//!
//! let _guard = init_logging(&LoggingConfig::from_env()?)?;
//! tracing::info!("resolving");
//! # Ok::<(), layoutmap_utils::LoggingError>(())
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (`debug`, `layoutmap_core=trace`), default `info`
//! - `LAYOUTMAP_LOG_FORMAT`: `pretty` (default) or `json`
//! - `LAYOUTMAP_LOG_FILE`: optional log file; a directory gets a dated
//!   `YYYY-MM-DD-layoutmap.log` inside it

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const LOG_FORMAT_ENV: &str = "LAYOUTMAP_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "LAYOUTMAP_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable, colored on the console
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Per-field resolution steps
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug' or 'trace')"
            ))),
        }
    }
}

/// Where and how to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `LAYOUTMAP_LOG_FORMAT` and `LAYOUTMAP_LOG_FILE`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `LAYOUTMAP_LOG_FORMAT` holds an unknown format.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`LoggingConfig::from_env`], reading variables through `lookup`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the format variable holds an unknown format.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggingError>
    {
        let format = lookup(LOG_FORMAT_ENV)
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or_default();
        let file = lookup(LOG_FILE_ENV).filter(|value| !value.is_empty()).map(PathBuf::from);

        Ok(Self {
            level: None,
            format,
            file,
        })
    }

    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    /// Filter precedence: explicit level, then `RUST_LOG`, then `info`.
    fn filter(&self) -> Result<EnvFilter, LoggingError>
    {
        if let Some(level) = self.level {
            return Ok(EnvFilter::new(Level::from(level).to_string()));
        }
        match env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.is_empty() => EnvFilter::try_new(&directives)
                .map_err(|err| LoggingError::InvalidLevel(format!("RUST_LOG={directives}: {err}"))),
            _ => Ok(EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Keeps the file writer alive; dropping it flushes pending file output.
#[derive(Debug)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// ## Errors
///
/// Returns an error if:
/// - A global subscriber is already installed
/// - `RUST_LOG` holds invalid directives
/// - The log file path has no file name
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let console = format_layer(config.format, io::stderr, true, config.filter()?);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let path = log_file_path(path);
            let name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;

            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(format_layer(config.format, writer, false, config.filter()?)), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// Shortcut for binaries that only pick a level and a format.
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_logging(&LoggingConfig {
        level: Some(level),
        format,
        file: None,
    })
}

fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer::<S>()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// A directory gets a dated file name inside it.
fn log_file_path(path: &Path) -> PathBuf
{
    if path.is_dir() {
        path.join(format!("{}-layoutmap.log", Utc::now().format("%Y-%m-%d")))
    } else {
        path.to_path_buf()
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Invalid log file: {0}")]
    InvalidFile(String),

    /// Usually a subscriber was already installed.
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
