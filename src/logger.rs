//! Record sink handle bound to one buffer.
//!
//! Every entry is encoded once as a JSON line, echoed to the configured
//! console and appended to the buffer so it can be shipped if an error
//! is reported later.

use std::io::Write;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::buffer::LogBuffer;
use crate::config::Console;
use crate::log_entry::{LogEntry, LogLevel};

#[derive(Clone)]
pub struct Logger {
    buffer: Arc<LogBuffer>,
    console: Console,
    fields: Map<String, Value>,
}

impl Logger {
    pub fn new(buffer: Arc<LogBuffer>, console: Console) -> Self {
        Self {
            buffer,
            console,
            fields: Map::new(),
        }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    /// Derive a logger that adds `key` to every entry.
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut logger = self.clone();
        logger.fields.insert(key.into(), value.into());
        logger
    }

    pub fn with_fields(&self, fields: Map<String, Value>) -> Self {
        let mut logger = self.clone();
        logger.fields.extend(fields);
        logger
    }

    pub fn log(&self, level: LogLevel, msg: &str) {
        self.log_with(level, msg, Map::new());
    }

    pub fn log_with(&self, level: LogLevel, msg: &str, extra: Map<String, Value>) {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        let line = LogEntry::new(level, msg, fields).to_line();
        self.echo(&line);
        self.buffer.append(&line);
    }

    pub fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg);
    }

    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log(LogLevel::Warn, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }

    /// Write an error entry and mark the buffer dirty. Does not flush.
    pub fn report_error(
        &self,
        msg: &str,
        err: &dyn std::error::Error,
        metadata: Option<Map<String, Value>>,
    ) {
        let mut extra = metadata.unwrap_or_default();
        extra.insert("error".into(), Value::String(err.to_string()));
        self.log_with(LogLevel::Error, &format!("{msg}: {err}"), extra);
        self.buffer.mark_dirty();
    }

    fn echo(&self, line: &[u8]) {
        // console output is best effort; the buffer copy is what matters
        let _ = match self.console {
            Console::Stdout => std::io::stdout().lock().write_all(line),
            Console::Stderr => std::io::stderr().lock().write_all(line),
            Console::Silent => Ok(()),
        };
    }
}
