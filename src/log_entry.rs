use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

const RESERVED_KEYS: [&str; 3] = ["level", "msg", "time"];

/// One structured line as it lands in a buffer: a flat JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub msg: String,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, msg: impl Into<String>, fields: Map<String, Value>) -> Self {
        // user fields must not shadow the fixed keys
        let fields = fields
            .into_iter()
            .map(|(k, v)| {
                if RESERVED_KEYS.contains(&k.as_str()) {
                    (format!("fields.{k}"), v)
                } else {
                    (k, v)
                }
            })
            .collect();
        Self {
            level,
            msg: msg.into(),
            time: Utc::now(),
            fields,
        }
    }

    /// JSON encoding terminated by a newline.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_else(|e| {
            format!(r#"{{"level":"error","msg":"unencodable log entry: {e}"}}"#).into_bytes()
        });
        line.push(b'\n');
        line
    }
}
