//! Structured logging for the explorer.
//!
//! Every record carries a level, an optional category and an optional JSON
//! payload (prompt, trial number, expression). Records below the configured
//! verbosity are dropped before they are built; the rest go to exactly one
//! [`LogSink`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Verbosity;

/// Receiver for records that pass the verbosity gate.
pub type LogCallback = Arc<dyn Fn(&ExplorerLogRecord) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Errors are always emitted; other levels need at least their own verbosity.
    pub fn enabled_at(self, verbose: Verbosity) -> bool {
        self == LogLevel::Error || (self as u8) <= verbose.as_u8()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplorerLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl ExplorerLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }

    /// `[category][LEVEL] message {payload}`, without a timestamp.
    pub fn compact_line(&self) -> String {
        let category = self.category.as_deref().unwrap_or("-");
        let mut line = format!("[{category}][{}] {}", self.level.label(), self.message);
        if let Some(aux) = self.auxiliary.as_ref().filter(|aux| !aux.is_null()) {
            line.push(' ');
            line.push_str(&aux.to_string());
        }
        line
    }
}

impl fmt::Display for ExplorerLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        write!(f, "{timestamp} {}", self.compact_line())
    }
}

/// Where records end up.
#[derive(Clone, Default)]
pub enum LogSink {
    /// One line per record on stderr, keeping stdout free for results.
    #[default]
    Stderr,
    External(LogCallback),
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Stderr => f.write_str("Stderr"),
            LogSink::External(_) => f.write_str("External"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExplorerLogger {
    verbose: Verbosity,
    sink: LogSink,
}

impl ExplorerLogger {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            sink: LogSink::Stderr,
        }
    }

    pub fn with_sink(verbose: Verbosity, sink: LogCallback) -> Self {
        Self {
            verbose,
            sink: LogSink::External(sink),
        }
    }

    pub fn verbose(&self) -> Verbosity {
        self.verbose
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.enabled_at(self.verbose)
    }

    /// Replace the sink; `None` falls back to stderr.
    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.sink = logger.map_or(LogSink::Stderr, LogSink::External);
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.enabled(level) {
            return;
        }

        let record = ExplorerLogRecord::new(message, level, category.map(str::to_string), auxiliary);
        match &self.sink {
            LogSink::Stderr => eprintln!("{record}"),
            LogSink::External(callback) => callback(&record),
        }
    }

    pub fn error(&self, message: impl Into<String>, category: Option<&str>, auxiliary: Option<Value>) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn info(&self, message: impl Into<String>, category: Option<&str>, auxiliary: Option<Value>) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(&self, message: impl Into<String>, category: Option<&str>, auxiliary: Option<Value>) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn capturing_sink() -> (Arc<Mutex<Vec<ExplorerLogRecord>>>, LogCallback) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let callback: LogCallback = Arc::new(move |record| {
            capture.lock().unwrap().push(record.clone());
        });
        (records, callback)
    }

    #[test]
    fn minimal_verbosity_keeps_only_errors() {
        let logger = ExplorerLogger::new(Verbosity::Minimal);
        assert!(logger.enabled(LogLevel::Error));
        assert!(!logger.enabled(LogLevel::Info));
        assert!(!logger.enabled(LogLevel::Debug));
        assert!(LogLevel::Debug.enabled_at(Verbosity::Detailed));
    }

    #[test]
    fn trial_records_reach_the_sink_with_payload() {
        let (records, callback) = capturing_sink();
        let logger = ExplorerLogger::with_sink(Verbosity::Detailed, callback);

        logger.debug(
            "trying query querySelector(\"h1\")",
            Some("dom_explorer"),
            Some(json!({ "trial": 2 })),
        );

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].level, LogLevel::Debug);
        assert_eq!(values[0].category.as_deref(), Some("dom_explorer"));
        assert_eq!(values[0].auxiliary, Some(json!({ "trial": 2 })));
    }

    #[test]
    fn debug_records_are_dropped_below_detailed() {
        let (records, callback) = capturing_sink();
        let logger = ExplorerLogger::with_sink(Verbosity::Medium, callback);

        logger.debug("noisy", None, Some(json!({ "trial": 1 })));
        logger.error("boom", Some("dom_explorer"), None);

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].level, LogLevel::Error);
    }

    #[test]
    fn clearing_the_sink_falls_back_to_stderr() {
        let (_, callback) = capturing_sink();
        let mut logger = ExplorerLogger::with_sink(Verbosity::Medium, callback);
        logger.set_external_logger(None);
        assert!(matches!(logger.sink, LogSink::Stderr));
    }

    #[test]
    fn compact_line_skips_null_payload() {
        let record = ExplorerLogRecord::new("done", LogLevel::Error, None, Some(Value::Null));
        assert_eq!(record.compact_line(), "[-][ERROR] done");

        let record = ExplorerLogRecord::new(
            "ready",
            LogLevel::Info,
            Some("dom_explorer".into()),
            Some(json!({ "trial": 1 })),
        );
        assert_eq!(record.compact_line(), "[dom_explorer][INFO] ready {\"trial\":1}");
        assert!(record.to_string().ends_with(" [dom_explorer][INFO] ready {\"trial\":1}"));
    }

    #[test]
    fn record_serializes_without_empty_fields() {
        let record = ExplorerLogRecord::new("msg", LogLevel::Debug, None, None);
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["level"], "debug");
        assert!(value.get("category").is_none());
        assert!(value.get("auxiliary").is_none());
    }
}
