//! Logging bootstrap for the auction store.
//!
//! # Responsibility
//! - Validate logging configuration before anything touches the file system.
//! - Start file-based rolling logs exactly once per process.
//! - Capture panics as sanitized log events.
//!
//! # Invariants
//! - Initialization is idempotent for an identical `LoggingConfig`.
//! - A second, different configuration is rejected, never applied.
//! - Initialization must not panic.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

/// Environment variable naming the log directory for binaries.
pub const LOG_DIR_ENV: &str = "AUCTION_LOG_DIR";

const LOG_FILE_BASENAME: &str = "auction";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    config: LoggingConfig,
    _handle: LoggerHandle,
}

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    level: &'static str,
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// Validates `level` (`trace|debug|info|warn|error`, case-insensitive,
    /// `warning` accepted) and `log_dir` (absolute, non-empty).
    pub fn new(level: &str, log_dir: impl AsRef<Path>) -> Result<Self, String> {
        Ok(Self {
            level: normalize_level(level)?,
            log_dir: normalize_log_dir(log_dir.as_ref())?,
        })
    }

    /// Same as [`LoggingConfig::new`] with [`default_log_level`].
    pub fn with_default_level(log_dir: impl AsRef<Path>) -> Result<Self, String> {
        Self::new(default_log_level(), log_dir)
    }

    /// Reads the log directory from `AUCTION_LOG_DIR` at the default level.
    ///
    /// Returns `Ok(None)` when the variable is unset or blank, meaning file
    /// logging stays off.
    pub fn from_env() -> Result<Option<Self>, String> {
        Self::from_env_value(std::env::var_os(LOG_DIR_ENV).map(PathBuf::from))
    }

    fn from_env_value(value: Option<PathBuf>) -> Result<Option<Self>, String> {
        match value {
            Some(dir) if !dir.as_os_str().is_empty() => Self::with_default_level(dir).map(Some),
            _ => Ok(None),
        }
    }

    pub fn level(&self) -> &'static str {
        self.level
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Starts process-wide file logging.
///
/// # Errors
/// - The log directory cannot be created.
/// - The logger backend fails to start.
/// - Logging is already active with a different configuration.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    if let Some(active) = ACTIVE_LOGGER.get() {
        return ensure_same_config(&active.config, config);
    }

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(config))?;
    ensure_same_config(&active.config, config)
}

/// Returns the active configuration, or `None` before `init_logging`.
pub fn logging_status() -> Option<LoggingConfig> {
    ACTIVE_LOGGER.get().map(|active| active.config.clone())
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(config: &LoggingConfig) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&config.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            config.log_dir.display()
        )
    })?;

    let handle = Logger::try_with_str(config.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", config.level))?
        .log_to_file(
            FileSpec::default()
                .directory(config.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();

    info!(
        "event=logging_init module=core status=ok platform={} version={} level={} log_dir={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.log_dir.display()
    );

    Ok(ActiveLogger {
        config: config.clone(),
        _handle: handle,
    })
}

fn ensure_same_config(active: &LoggingConfig, requested: &LoggingConfig) -> Result<(), String> {
    if active.log_dir != requested.log_dir {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            active.log_dir.display(),
            requested.log_dir.display()
        ));
    }
    if active.level != requested.level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            active.level, requested.level
        ));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &Path) -> Result<PathBuf, String> {
    if log_dir.as_os_str().is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    if !log_dir.is_absolute() {
        return Err(format!(
            "log_dir must be an absolute path, got `{}`",
            log_dir.display()
        ));
    }
    Ok(log_dir.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            panic_payload_summary(panic_info)
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

// Payloads may echo user data; keep them on one line and bounded.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let single_line = value.replace(['\n', '\r'], " ");
    let mut truncated: String = single_line.chars().take(max_chars).collect();
    if single_line.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        default_log_level, init_logging, logging_status, normalize_level, sanitize_message,
        LoggingConfig,
    };
    use std::path::PathBuf;

    #[test]
    fn level_names_are_normalized() {
        assert_eq!(normalize_level(" INFO ").unwrap(), "info");
        assert_eq!(normalize_level("Warning").unwrap(), "warn");
        assert!(normalize_level("verbose").is_err());
    }

    #[test]
    fn config_rejects_relative_and_empty_dirs() {
        let relative = LoggingConfig::new("info", "logs/dev").unwrap_err();
        assert!(relative.contains("absolute"));
        assert!(LoggingConfig::new("info", "").is_err());
    }

    #[test]
    fn env_value_selects_log_dir_at_default_level() {
        assert_eq!(LoggingConfig::from_env_value(None).unwrap(), None);
        assert_eq!(
            LoggingConfig::from_env_value(Some(PathBuf::new())).unwrap(),
            None
        );

        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::from_env_value(Some(dir.path().to_path_buf()))
            .unwrap()
            .unwrap();
        assert_eq!(config.log_dir(), dir.path());
        assert_eq!(config.level(), default_log_level());

        assert!(LoggingConfig::from_env_value(Some(PathBuf::from("logs"))).is_err());
    }

    #[test]
    fn sanitize_message_flattens_and_truncates() {
        let sanitized = sanitize_message("bid\nrejected\rtwice", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert_eq!(sanitized, "bid reje...");
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicting_config() {
        let first_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        let config = LoggingConfig::new("info", first_dir.path()).unwrap();
        init_logging(&config).unwrap();
        init_logging(&config).unwrap();

        let other_level = LoggingConfig::new("debug", first_dir.path()).unwrap();
        assert!(init_logging(&other_level)
            .unwrap_err()
            .contains("refusing to switch"));

        let other_location = LoggingConfig::new("info", other_dir.path()).unwrap();
        assert!(init_logging(&other_location)
            .unwrap_err()
            .contains("refusing to switch"));

        assert_eq!(logging_status(), Some(config));
    }
}
