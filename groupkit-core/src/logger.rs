//! Bridge from the `log` facade to a logger supplied by the host app.
//!
//! Library code logs with the regular `log` macros. Once the host calls
//! [`set_logger`], every record is forwarded to its [`Logger`]; before that,
//! records are dropped.
//!
//! ## Swift
//!
//! ```swift
//! final class GroupKitLoggerBridge: GroupKit.Logger {
//!     func log(level: GroupKit.LogLevel, message: String) {
//!         os_log("%{public}@", message)
//!     }
//! }
//!
//! GroupKit.setLogger(logger: GroupKitLoggerBridge()) // once, at launch
//! ```

use std::sync::{Arc, OnceLock};

const CRATE_PREFIX: &str = "groupkit";

/// Receives log messages from the storage layer.
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Diagnostics, including values that failed to decode and skipped
    /// migration sources.
    Debug,
    /// Milestones such as completed migrations.
    Info,
    /// Degraded operation: dropped writes, backend fallbacks.
    Warn,
    /// Storage could not be provided at all.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// Debug and trace output of dependencies is noise for the host.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    !verbose || module_path.is_some_and(|path| path.starts_with(CRATE_PREFIX))
}

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        should_forward(metadata.level(), Some(metadata.target()))
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host logger. Only the first call has an effect.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        log::info!("logger already set, ignoring");
        return;
    }

    static LOGGER: ForeignLogger = ForeignLogger;
    match log::set_logger(&LOGGER) {
        Ok(()) => log::set_max_level(log::LevelFilter::Trace),
        Err(err) => eprintln!("groupkit: failed to install logger: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(log::Level::Debug, Some("groupkit_core::storage"), true ; "own debug")]
    #[test_case(log::Level::Trace, Some("memmap2"), false ; "dependency trace")]
    #[test_case(log::Level::Debug, None, false ; "unknown debug")]
    #[test_case(log::Level::Warn, Some("uniffi"), true ; "dependency warn")]
    #[test_case(log::Level::Error, None, true ; "unknown error")]
    fn test_should_forward(level: log::Level, module: Option<&str>, expected: bool) {
        assert_eq!(should_forward(level, module), expected);
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::from(log::Level::Trace), LogLevel::Trace);
    }
}
