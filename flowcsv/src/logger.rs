//! Diagnostics channel for the emitter.
//!
//! Absorbed record problems and session events are reported through the
//! [`Logger`] trait instead of a global logging facade, so callers decide
//! where diagnostics go and tests can assert on them.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Verbosity level for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Always shown: absorbed record problems.
    Normal,
    /// Session lifecycle.
    Verbose,
    /// Per-line detail such as tunnel unwrapping.
    Debug,
}

impl Verbosity {
    /// Create verbosity from a `-v` flag count.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }
}

/// Trait for diagnostic output.
pub trait Logger: Send + Sync {
    /// Log a message at the given verbosity level.
    fn log(&self, level: Verbosity, message: &str);

    fn warn(&self, message: &str) {
        self.log(Verbosity::Normal, &format!("warning: {}", message));
    }

    fn verbose(&self, message: &str) {
        self.log(Verbosity::Verbose, message);
    }

    fn debug(&self, message: &str) {
        self.log(Verbosity::Debug, message);
    }
}

/// Logger writing one line per message to any writer.
#[derive(Debug)]
pub struct StreamLogger<W> {
    level: Verbosity,
    out: Mutex<W>,
}

/// Logger writing to stderr.
pub type StderrLogger = StreamLogger<io::Stderr>;

impl<W: Write + Send> StreamLogger<W> {
    /// Create a logger that shows messages up to `level`.
    pub fn new(level: Verbosity, out: W) -> Self {
        Self {
            level,
            out: Mutex::new(out),
        }
    }

    /// Consume the logger and return the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl StreamLogger<io::Stderr> {
    pub fn stderr(level: Verbosity) -> Self {
        Self::new(level, io::stderr())
    }
}

impl<W: Write + Send> Logger for StreamLogger<W> {
    fn log(&self, level: Verbosity, message: &str) {
        if level <= self.level {
            let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
            // Diagnostics must never fail emission.
            let _ = writeln!(out, "{}", message);
        }
    }
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Verbosity,
    pub message: String,
}

/// Logger that captures every message, at every level, for assertions.
///
/// Cloning creates a new handle to the same captured entries.
#[derive(Debug, Clone, Default)]
pub struct MockLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn messages_at_level(&self, level: Verbosity) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// True if any message contains `substring`.
    pub fn contains(&self, substring: &str) -> bool {
        self.lock().iter().any(|e| e.message.contains(substring))
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

impl Logger for MockLogger {
    fn log(&self, level: Verbosity, message: &str) {
        self.lock().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

/// A no-op logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Verbosity, _message: &str) {}
}
