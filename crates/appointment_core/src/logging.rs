//! Logging bootstrap and safety policy.
//!
//! # Responsibility
//! - Initialize the `log` backend exactly once per process.
//! - Route diagnostics to rolling files or to stderr.
//!
//! # Invariants
//! - Logging init is idempotent for the same target and level.
//! - Re-initialization with a different target or level is rejected.
//! - Logging initialization must not panic.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "appointments";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Rolling files in an absolute directory; warnings are echoed to stderr.
    Directory(PathBuf),
}

impl Display for LogTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// Already initialized with a different level or target.
    Conflict(String),
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

struct LoggingState {
    level: &'static str,
    target: LogTarget,
    _logger: LoggerHandle,
}

/// Initializes logging with `level`, writing to `log_dir` when given and to
/// stderr otherwise.
///
/// # Errors
/// - `UnsupportedLevel` for unknown levels.
/// - `InvalidDirectory` when `log_dir` is relative or cannot be created.
/// - `Conflict` when logging is already active with other settings.
/// - `Backend` when the logger backend fails to start.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<(), LoggingError> {
    let level = normalize_level(level)?;
    let target = match log_dir {
        Some(dir) => LogTarget::Directory(normalize_log_dir(dir)?),
        None => LogTarget::Stderr,
    };

    if let Some(state) = LOGGING_STATE.get() {
        return check_same(state, level, &target);
    }

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, LoggingError> {
        let logger = start_logger(level, &target)?;
        install_panic_hook_once();

        info!(
            "event=app_start module=core status=ok platform={} build_mode={} version={}",
            std::env::consts::OS,
            build_mode(),
            env!("CARGO_PKG_VERSION")
        );
        info!(
            "event=logging_init module=core status=ok level={} target={}",
            level, target
        );

        Ok(LoggingState {
            level,
            target: target.clone(),
            _logger: logger,
        })
    })?;

    check_same(state, level, &target)
}

/// Stderr-only variant of [`init_logging`].
pub fn init_stderr_logging(level: &str) -> Result<(), LoggingError> {
    init_logging(level, None)
}

/// Returns `(level, target)` once logging is active.
pub fn logging_status() -> Option<(&'static str, LogTarget)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.target.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(level: &'static str, target: &LogTarget) -> Result<LoggerHandle, LoggingError> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| LoggingError::Backend(format!("invalid log spec `{level}`: {err}")))?;

    let logger = match target {
        LogTarget::Stderr => logger
            .log_to_stderr()
            .format(flexi_logger::detailed_format),
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                LoggingError::InvalidDirectory(format!(
                    "failed to create `{}`: {err}",
                    dir.display()
                ))
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .duplicate_to_stderr(Duplicate::Warn)
                .format_for_files(flexi_logger::detailed_format)
        }
    };

    logger
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))
}

fn check_same(
    state: &LoggingState,
    level: &'static str,
    target: &LogTarget,
) -> Result<(), LoggingError> {
    if &state.target != target {
        return Err(LoggingError::Conflict(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.target, target
        )));
    }
    if state.level != level {
        return Err(LoggingError::Conflict(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, level
        )));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(dir: &Path) -> Result<PathBuf, LoggingError> {
    if dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "log_dir cannot be empty".to_string(),
        ));
    }
    if !dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "log_dir must be an absolute path, got `{}`",
            dir.display()
        )));
    }
    Ok(dir.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.get().is_some() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Panic payloads can carry request text (names, phone numbers).
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));

    let _ = PANIC_HOOK_INSTALLED.set(());
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, normalize_log_dir, sanitize_message,
        LogTarget, LoggingError,
    };
    use std::path::Path;

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert!(matches!(
            normalize_level("loud"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn normalize_log_dir_rejects_relative_path() {
        let error = normalize_log_dir(Path::new("logs/dev")).unwrap_err();
        assert!(error.to_string().contains("absolute"));
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    // Logging state is process-global, so every init assertion lives in one test.
    #[test]
    fn init_logging_is_idempotent_and_rejects_conflicts() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        init_logging("info", Some(log_dir.path())).unwrap();
        init_logging("INFO", Some(log_dir.path())).unwrap();

        let level_error = init_logging("debug", Some(log_dir.path())).unwrap_err();
        assert!(level_error.to_string().contains("refusing to switch"));

        let dir_error = init_logging("info", Some(other_dir.path())).unwrap_err();
        assert!(matches!(dir_error, LoggingError::Conflict(_)));

        let stderr_error = init_logging("info", None).unwrap_err();
        assert!(matches!(stderr_error, LoggingError::Conflict(_)));

        let (level, target) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(target, LogTarget::Directory(log_dir.path().to_path_buf()));
    }
}
