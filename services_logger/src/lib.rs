//! # Logger Service
//!
//! This crate implements structured logging for device components.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//!
//! - Every [`Logger`] carries a component tag (`"board"`, `"pairing"`, ...)
//!   that becomes the `log` target
//! - Entries carry key/value fields next to the message
//! - Entries are forwarded to the `log` facade; whichever backend the binary
//!   installs decides where they go
//! - A [`LogCapture`] can be attached so tests assert on what was logged
//!   instead of scraping output

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Component that produced the entry
    pub tag: String,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            tag: String::new(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Sets the source component
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Looks up a field value by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Shared in-memory record of log entries.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries at exactly `level`
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    pub fn warnings(&self) -> Vec<LogEntry> {
        self.at_level(LogLevel::Warn)
    }

    /// True if any entry's message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|entry| entry.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tagged structured logger.
#[derive(Debug, Clone)]
pub struct Logger {
    tag: String,
    capture: Option<LogCapture>,
}

impl Logger {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            capture: None,
        }
    }

    /// Also records every entry into `capture`
    pub fn with_capture(mut self, capture: LogCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    /// A logger for a sub-component sharing this logger's capture
    pub fn child(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            capture: self.capture.clone(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Emits a fully built entry. The entry's tag is overwritten with this
    /// logger's tag.
    pub fn log(&self, entry: LogEntry) {
        let entry = entry.with_tag(self.tag.as_str());
        log::log!(target: self.tag.as_str(), entry.level.as_log(), "{}", entry);
        if let Some(capture) = &self.capture {
            capture.push(entry);
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, message));
    }
}
