//! Logging configuration and initialization.
//!
//! JSON lines for production, pretty output for development, written to
//! stderr or a file.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Parse `json` or `pretty`, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `kana_core::session=debug`.
    pub level: String,
    /// Log file; stderr when `None`.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

impl LogConfig {
    /// Read `RUST_LOG`, `KANA_CORE_LOG_FORMAT` and `KANA_CORE_LOG_FILE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            format: std::env::var("KANA_CORE_LOG_FORMAT")
                .ok()
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            level: std::env::var("RUST_LOG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.level),
            output_path: std::env::var_os("KANA_CORE_LOG_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    match config.format {
        LogFormat::Json => init_json_subscriber(filter, config.output_path.as_deref()),
        LogFormat::Pretty => init_pretty_subscriber(filter, config.output_path.as_deref()),
    }
}

fn open_log_file(path: &Path) -> Result<std::sync::Mutex<std::fs::File>, LogError> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(std::sync::Mutex::new)
        .map_err(|e| LogError::FileOpen(format!("{}: {}", path.display(), e)))
}

fn init_json_subscriber(filter: EnvFilter, path: Option<&Path>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);

    match path {
        Some(path) => registry
            .with(fmt::layer().json().with_writer(open_log_file(path)?))
            .try_init(),
        None => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

fn init_pretty_subscriber(filter: EnvFilter, path: Option<&Path>) -> Result<(), LogError> {
    let registry = tracing_subscriber::registry().with(filter);

    match path {
        Some(path) => registry
            .with(fmt::layer().pretty().with_ansi(false).with_writer(open_log_file(path)?))
            .try_init(),
        None => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}
