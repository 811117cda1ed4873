//! Append-only in-memory solve log.
//!
//! The spec requires the log to be a *return value* ("Logging is an
//! append-only in-memory buffer; consumers read it after each solve"), not
//! just an ambient side-effect -- so every call to [`SolveLog::push`] both
//! emits a `tracing` event (for whoever has a subscriber installed) and
//! appends a formatted line the orchestrator hands back in `SolveResult`.

/// Severity of a log entry, mirroring `tracing::Level` without depending on
/// a subscriber being installed to observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One recorded log line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Accumulates log entries for a single solve.
#[derive(Debug, Clone, Default)]
pub struct SolveLog {
    entries: Vec<LogEntry>,
}

impl SolveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.entries.push(LogEntry { level: LogLevel::Debug, message });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.entries.push(LogEntry { level: LogLevel::Info, message });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.entries.push(LogEntry { level: LogLevel::Warn, message });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.entries.push(LogEntry { level: LogLevel::Error, message });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
