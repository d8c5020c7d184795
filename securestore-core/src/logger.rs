//! Forwards `log` records from this crate to a host-supplied logger.
//!
//! Mobile hosts have no stderr worth reading, so the library logs through the
//! `log` facade and the host installs a [`Logger`] once at startup. Debug and
//! trace records from other crates are dropped; everything from this crate
//! and every info-or-higher record is forwarded.

use std::sync::{Arc, OnceLock};

/// Sink for log messages, implemented by the host application.
///
/// # Examples
///
/// ```rust
/// use securestore_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object SecureStoreLogBridge : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "SecureStore", message)
///     }
/// }
///
/// setLogger(SecureStoreLogBridge) // once, in Application.onCreate
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Records `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal progress, such as master key creation.
    Info,
    /// Recoverable problems, such as an isolation level fallback.
    Warn,
    /// Failures reported to the caller.
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

const CRATE_PREFIX: &str = "securestore";

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        is_forwarded(metadata.level(), metadata.target())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

fn is_forwarded(level: log::Level, target: &str) -> bool {
    level <= log::Level::Info || target.starts_with(CRATE_PREFIX)
}

/// Installs `logger` as the destination for this crate's log records.
///
/// Only the first call takes effect. Later calls, or a call made after
/// another `log` implementation was installed in the process, are ignored
/// with a message on stderr.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    static FORWARDER: ForeignLogger = ForeignLogger;

    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("securestore logger already set");
        return;
    }
    match log::set_logger(&FORWARDER) {
        Ok(()) => log::set_max_level(log::LevelFilter::Trace),
        Err(err) => eprintln!("failed to install securestore logger: {err}"),
    }
}
