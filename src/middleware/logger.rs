//! In-app log buffer
//!
//! Keeps the most recent entries (newest first) for display and export.
//! WARN and ERROR entries are mirrored to the `tracing` diagnostic channel.

use crate::core::{format_rfc3339, Listeners, RingBuffer, SharedClock, Subscription};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Default number of entries retained
pub const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Single immutable log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Bounded application log with subscribers
pub struct Logger {
    clock: SharedClock,
    // Stored oldest first; exposed newest first
    entries: Mutex<RingBuffer<LogEntry>>,
    listeners: Listeners<[LogEntry]>,
}

impl Logger {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(clock, MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(clock: SharedClock, max_entries: usize) -> Self {
        Self {
            clock,
            entries: Mutex::new(RingBuffer::new(max_entries)),
            listeners: Listeners::new(),
        }
    }

    /// Record an entry and notify subscribers
    pub fn log(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: format_rfc3339(self.clock.now_ms()),
            level,
            message: message.into(),
            context,
        };

        match entry.level {
            LogLevel::Error => {
                crate::log_pipeline!(tracing::Level::ERROR, context = ?entry.context, "{}", entry.message)
            }
            LogLevel::Warn => {
                crate::log_pipeline!(tracing::Level::WARN, context = ?entry.context, "{}", entry.message)
            }
            LogLevel::Debug | LogLevel::Info => {}
        }

        let snapshot = {
            let mut entries = self.entries.lock();
            entries.push(entry);
            self.snapshot_for_listeners(&entries)
        };
        if let Some(snapshot) = snapshot {
            self.listeners.notify(&snapshot);
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    pub fn debug_with(&self, message: impl Into<String>, context: Value) {
        self.log(LogLevel::Debug, message, Some(context));
    }

    pub fn info_with(&self, message: impl Into<String>, context: Value) {
        self.log(LogLevel::Info, message, Some(context));
    }

    pub fn warn_with(&self, message: impl Into<String>, context: Value) {
        self.log(LogLevel::Warn, message, Some(context));
    }

    pub fn error_with(&self, message: impl Into<String>, context: Value) {
        self.log(LogLevel::Error, message, Some(context));
    }

    /// Snapshot of current entries, newest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.entries.lock().to_vec_rev()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry and notify subscribers
    pub fn clear(&self) {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.clear();
            self.snapshot_for_listeners(&entries)
        };
        if let Some(snapshot) = snapshot {
            self.listeners.notify(&snapshot);
        }
    }

    /// Register a listener receiving the full sequence (newest first) after
    /// every mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[LogEntry]) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    fn snapshot_for_listeners(&self, entries: &RingBuffer<LogEntry>) -> Option<Vec<LogEntry>> {
        if self.listeners.is_empty() {
            None
        } else {
            Some(entries.to_vec_rev())
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("entries", &self.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
