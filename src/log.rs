//! Structured logging for tiling runs.
//!
//! Log levels:
//! - ERROR: Tool failures and aggregation problems
//! - WARN: Recoverable conditions (missing inputs, images without tiles)
//! - INFO: Run progress (invocations, skips, archive writes)
//! - DEBUG: Full command lines, resolved paths
//! - TRACE: Captured tool stdout
//!
//! A `Logger` is created by the top-level run and handed to every component.
//! Debug mode can be enabled with `--debug` flag or `SLIDETILER_DEBUG=1` env var.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// A single captured log line (memory sink only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug)]
enum Sink {
    File(PathBuf),
    Memory(Mutex<Vec<LogRecord>>),
    Null,
}

#[derive(Debug)]
struct Inner {
    sink: Sink,
    level: AtomicU8,
    // Serializes appends so lines from concurrent workers never interleave.
    write_lock: Mutex<()>,
}

/// Handle to the run's log sink. Clones share the same sink.
#[derive(Debug, Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    fn with_sink(sink: Sink, level: LogLevel) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                level: AtomicU8::new(level as u8),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Append to the log file at `path`, creating it if needed.
    ///
    /// Unlike a session log the file is never truncated: successive runs
    /// accumulate in the same sink.
    pub fn to_file(path: impl Into<PathBuf>, level: LogLevel) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::with_sink(Sink::File(path), level)
    }

    /// Capture records in memory. Used by tests to assert on diagnostics.
    pub fn memory(level: LogLevel) -> Self {
        Self::with_sink(Sink::Memory(Mutex::new(Vec::new())), level)
    }

    /// Discard everything.
    pub fn null() -> Self {
        Self::with_sink(Sink::Null, LogLevel::Error)
    }

    /// Pick the level from the `--debug` flag and the `SLIDETILER_DEBUG` env var.
    pub fn level_for(debug: bool) -> LogLevel {
        let env_debug = std::env::var("SLIDETILER_DEBUG")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);
        if debug || env_debug {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.inner.sink {
            Sink::File(p) => Some(p),
            _ => None,
        }
    }

    /// Set the minimum log level for output.
    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level as u8, Ordering::SeqCst);
    }

    /// Get the current log level.
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::Relaxed))
    }

    /// Log a message at the specified level.
    pub fn log_at(&self, level: LogLevel, msg: &str) {
        if level > self.level() {
            return;
        }

        match &self.inner.sink {
            Sink::File(path) => {
                let _guard = self.inner.write_lock.lock();
                if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
                }
            }
            Sink::Memory(records) => {
                if let Ok(mut records) = records.lock() {
                    records.push(LogRecord {
                        level,
                        message: msg.to_string(),
                    });
                }
            }
            Sink::Null => {}
        }
    }

    pub fn error(&self, msg: &str) {
        self.log_at(LogLevel::Error, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log_at(LogLevel::Warn, msg);
    }

    pub fn info(&self, msg: &str) {
        self.log_at(LogLevel::Info, msg);
    }

    pub fn debug(&self, msg: &str) {
        self.log_at(LogLevel::Debug, msg);
    }

    pub fn trace(&self, msg: &str) {
        self.log_at(LogLevel::Trace, msg);
    }

    /// Snapshot of captured records. Empty for file and null sinks.
    pub fn records(&self) -> Vec<LogRecord> {
        match &self.inner.sink {
            Sink::Memory(records) => records.lock().map(|r| r.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Captured records at exactly `level`.
    pub fn records_at(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! tlog {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! tlog_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! tlog_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! tlog_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level.
#[macro_export]
macro_rules! tlog_trace {
    ($logger:expr, $($arg:tt)*) => {
        $logger.trace(&format!($($arg)*))
    };
}
