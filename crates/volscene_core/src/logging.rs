//! File logging for hosts embedding `volscene_core`.
//!
//! # Responsibility
//! - Start one rolling file logger per process from a typed `LogConfig`.
//! - Report the active configuration so hosts can print where logs go.
//!
//! # Invariants
//! - Starting twice with an equal config is a no-op; a different config is
//!   a `LoggingError::Conflict`.
//! - Scene, unit and volume events are `event=... module=... status=...`
//!   key/value lines without voxel data or file contents.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_FILE_BASENAME: &str = "volscene";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 5;
const PANIC_MESSAGE_CHARS: usize = 160;

static ACTIVE: OnceCell<(LogConfig, LoggerHandle)> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Minimum level written to the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::InvalidLevel(value.trim().to_string())),
        }
    }
}

/// `debug` in debug builds, `info` otherwise.
pub fn default_log_level() -> LogLevel {
    if cfg!(debug_assertions) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Level and absolute directory of the file logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub dir: PathBuf,
}

impl LogConfig {
    /// Validates `dir`: it must be non-empty and absolute.
    pub fn new(level: LogLevel, dir: impl AsRef<Path>) -> LoggingResult<Self> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(LoggingError::InvalidDir("empty path".to_string()));
        }
        if !dir.is_absolute() {
            return Err(LoggingError::InvalidDir(format!(
                "`{}` is not absolute",
                dir.display()
            )));
        }
        Ok(Self {
            level,
            dir: dir.to_path_buf(),
        })
    }
}

pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel(String),
    InvalidDir(String),
    /// Logging already runs with another configuration.
    Conflict { active: LogConfig, requested: LogConfig },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(value) => write!(
                f,
                "unsupported log level `{value}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDir(message) => write!(f, "invalid log directory: {message}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already runs at `{}` ({}); refusing `{}` ({})",
                active.dir.display(),
                active.level,
                requested.dir.display(),
                requested.level
            ),
            Self::Backend(message) => write!(f, "logger backend failed: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts the rolling file logger described by `config`.
///
/// # Errors
/// - `Conflict` when logging already runs with a different config.
/// - `Backend` when the directory cannot be created or the logger fails.
pub fn init_logging(config: &LogConfig) -> LoggingResult<()> {
    let (active, _) = ACTIVE.get_or_try_init(|| start(config))?;
    if active != config {
        return Err(LoggingError::Conflict {
            active: active.clone(),
            requested: config.clone(),
        });
    }
    Ok(())
}

/// Active configuration, `None` before `init_logging` succeeded.
pub fn logging_status() -> Option<&'static LogConfig> {
    ACTIVE.get().map(|(config, _)| config)
}

fn start(config: &LogConfig) -> LoggingResult<(LogConfig, LoggerHandle)> {
    std::fs::create_dir_all(&config.dir).map_err(|err| {
        LoggingError::Backend(format!("create `{}`: {err}", config.dir.display()))
    })?;
    let handle = Logger::try_with_str(config.level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(config.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    log::info!(
        "event=logging_start module=core status=ok version={} level={} dir={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.dir.display()
    );
    Ok((config.clone(), handle))
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let location = info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log::error!(
            "event=panic module=core status=error location={location} payload={}",
            one_line(&payload, PANIC_MESSAGE_CHARS)
        );
        previous(info);
    }));
}

/// Single line of at most `max_chars` characters plus an ellipsis.
fn one_line(value: &str, max_chars: usize) -> String {
    let joined = value.replace(['\n', '\r'], " ");
    if joined.chars().count() <= max_chars {
        return joined;
    }
    let mut capped: String = joined.chars().take(max_chars).collect();
    capped.push_str("...");
    capped
}
