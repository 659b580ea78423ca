//! Diagnostics for the Lumen render core
//!
//! Every component reports through one installed `Logger`. The default one
//! prints colored lines to stderr; error lines carry the file and line of
//! the call site.
//!
//! The installed logger is the only process-wide state in the crate.
//! Registries, factories and devices are always passed explicitly.

use colored::*;
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Global logger slot (DefaultLogger until replaced)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Sink for render core diagnostics
///
/// Install an implementation with `set_logger` to capture lifetime and
/// contract diagnostics in an editor console or a test.
///
/// # Example
///
/// ```no_run
/// use lumen_render_core::lumen::log::{Logger, LogEntry};
///
/// struct FileLogger {
///     path: std::path::PathBuf,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // append entry.message to self.path
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    fn log(&self, entry: &LogEntry);
}

/// One diagnostic line
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// How serious the event is
    pub severity: LogSeverity,

    /// When the entry was emitted
    pub timestamp: SystemTime,

    /// Source component (e.g., "lumen::ResourceRegistry")
    pub source: String,

    /// Log message
    pub message: String,

    /// Call site file, set by `lumen_error!`
    pub file: Option<&'static str>,

    /// Call site line, set by `lumen_error!`
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Very verbose debug information
    Trace,

    /// Culling and materialization summaries
    Debug,

    /// Device lifecycle and clean shutdown
    Info,

    /// Warning messages (stale handles, leaks)
    Warn,

    /// Error messages (contract and lifetime violations, with file:line details)
    Error,
}

/// Colored stderr logger
///
/// Lines look like `[timestamp] [SEVERITY] [source] message`, followed by
/// `(file:line)` when the entry has a call site.
pub struct DefaultLogger;

impl DefaultLogger {
    /// Render an entry as a single uncolored line
    pub fn format_plain(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f");
        let severity = match entry.severity {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        };
        match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity, entry.source, entry.message, file, line
            ),
            _ => format!("[{}] [{}] [{}] {}", timestamp, severity, entry.source, entry.message),
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            eprintln!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            );
        } else {
            eprintln!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message);
        }
    }
}

// ===== GLOBAL LOGGER =====

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Replace the installed logger
pub fn set_logger<L: Logger + 'static>(logger: L) {
    if let Ok(mut lock) = logger_slot().write() {
        *lock = Box::new(logger);
    }
}

/// Restore the DefaultLogger
pub fn reset_logger() {
    if let Ok(mut lock) = logger_slot().write() {
        *lock = Box::new(DefaultLogger);
    }
}

/// Log a message without file/line information
pub fn log(severity: LogSeverity, source: &str, message: String) {
    if let Ok(lock) = logger_slot().read() {
        lock.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        });
    }
}

/// Log a message with file/line information
pub fn log_detailed(
    severity: LogSeverity,
    source: &str,
    message: String,
    file: &'static str,
    line: u32,
) {
    if let Ok(lock) = logger_slot().read() {
        lock.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }
}

// ===== MACROS =====

/// Log a TRACE message
#[macro_export]
macro_rules! lumen_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Trace, $source, format!($($arg)*))
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! lumen_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Debug, $source, format!($($arg)*))
    };
}

/// Log an INFO message
#[macro_export]
macro_rules! lumen_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Info, $source, format!($($arg)*))
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! lumen_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Warn, $source, format!($($arg)*))
    };
}

/// Log an ERROR message tagged with the call site
///
/// # Example
///
/// ```no_run
/// lumen_render_core::lumen_error!("lumen::Device", "Failed to map buffer: {}", "out of memory");
/// ```
#[macro_export]
macro_rules! lumen_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an error and build the matching `Error` variant
///
/// # Example
///
/// ```no_run
/// use lumen_render_core::lumen::Error;
///
/// let err: Error = lumen_render_core::lumen_err!(
///     "lumen::RenderGraphBuilder", ContractViolation, "resource '{}' is not readable", "depth");
/// ```
#[macro_export]
macro_rules! lumen_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::lumen_error!($source, "{}", message);
        $crate::lumen::Error::$kind(message)
    }};
}

/// Log an error and return it from the enclosing function
#[macro_export]
macro_rules! lumen_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::lumen_err!($source, $kind, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
