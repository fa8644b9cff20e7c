use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MAX_BUFFERS: usize = 200;
pub const DEFAULT_MAX_FILES: usize = 20;
pub const DEFAULT_COLLECTOR_HOST: &str = "127.0.0.1";
pub const DEFAULT_COLLECTOR_PORT: u16 = 24225;

fn default_max_buffers() -> usize {
    DEFAULT_MAX_BUFFERS
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}

fn default_collector_host() -> String {
    DEFAULT_COLLECTOR_HOST.to_string()
}

fn default_collector_port() -> u16 {
    DEFAULT_COLLECTOR_PORT
}

/// Where a `Logger` echoes every entry besides its buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
    Silent,
}

/// Destination of a buffer, fixed when the buffer is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Rotating local files under `base_path`.
    File { base_path: String },
    /// One object per key in `bucket`, named like the local files.
    ObjectStore {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
    /// Push every buffered JSON line to a forward-protocol collector.
    Collector {
        #[serde(default = "default_collector_host")]
        host: String,
        #[serde(default = "default_collector_port")]
        port: u16,
    },
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::File { .. } => "file",
            SinkConfig::ObjectStore { .. } => "object store",
            SinkConfig::Collector { .. } => "collector",
        }
    }

    pub fn default_collector() -> Self {
        SinkConfig::Collector {
            host: default_collector_host(),
            port: default_collector_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Base URL of an S3-compatible endpoint; objects live at `{endpoint}/{bucket}/{key}`.
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Process-wide tunables, applied when the pool and flusher are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushLogConfig {
    #[serde(default = "default_max_buffers")]
    pub max_buffers: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    #[serde(default)]
    pub console: Console,
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
}

impl FlushLogConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl Default for FlushLogConfig {
    fn default() -> Self {
        Self {
            max_buffers: default_max_buffers(),
            max_files: default_max_files(),
            remote_timeout_ms: default_remote_timeout_ms(),
            console: Console::default(),
            object_store: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub rate_per_sec: f64,
    /// Probability that a simulated request ends in a reported error.
    pub error_rate: f64,
    #[serde(default = "default_lines_per_request")]
    pub lines_per_request: usize,
    pub sink: SinkConfig,
}

fn default_lines_per_request() -> usize {
    5
}

/// Configuration of the `flushlog-demo` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    pub run_duration_secs: u64,
    #[serde(default)]
    pub flushlog: FlushLogConfig,
    pub services: Vec<ServiceConfig>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let file_sink = SinkConfig::File {
            base_path: std::env::temp_dir()
                .join("flushlog/")
                .to_string_lossy()
                .into_owned(),
        };
        Self {
            run_duration_secs: 10,
            flushlog: FlushLogConfig::default(),
            services: vec![
                ServiceConfig {
                    name: "api-gateway".into(),
                    rate_per_sec: 20.0,
                    error_rate: 0.05,
                    lines_per_request: default_lines_per_request(),
                    sink: file_sink.clone(),
                },
                ServiceConfig {
                    name: "payment-service".into(),
                    rate_per_sec: 5.0,
                    error_rate: 0.2,
                    lines_per_request: default_lines_per_request(),
                    sink: file_sink,
                },
            ],
        }
    }
}

/// Expand `${VAR_NAME}` patterns in a string with environment variable values.
/// Unknown vars become empty strings.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..start],
            value,
            &result[start + end + 1..]
        );
    }
    result
}

pub fn parse_config(contents: &str) -> Result<DemoConfig, ConfigError> {
    let expanded = expand_env_vars(contents);
    Ok(serde_yaml::from_str(&expanded)?)
}

pub fn load_config(path: &Path) -> Result<DemoConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_and_unknown_vars() {
        // SAFETY: test-only env mutation on a variable no other test reads
        unsafe { std::env::set_var("FLUSHLOG_TEST_BUCKET", "audit") };
        let out = expand_env_vars("bucket: ${FLUSHLOG_TEST_BUCKET}${FLUSHLOG_TEST_MISSING}/x");
        assert_eq!(out, "bucket: audit/x");
    }

    #[test]
    fn unterminated_var_is_left_alone() {
        assert_eq!(expand_env_vars("a ${OOPS"), "a ${OOPS");
    }

    #[test]
    fn parses_tagged_sinks_with_defaults() {
        let yaml = r#"
run_duration_secs: 3
flushlog:
  max_buffers: 50
  console: silent
services:
  - name: billing
    rate_per_sec: 2.0
    error_rate: 0.5
    sink:
      type: collector
  - name: search
    rate_per_sec: 1.0
    error_rate: 0.1
    sink:
      type: objectstore
      bucket: logs
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.flushlog.max_buffers, 50);
        assert_eq!(config.flushlog.max_files, DEFAULT_MAX_FILES);
        assert_eq!(config.flushlog.console, Console::Silent);
        assert_eq!(config.services[0].sink, SinkConfig::default_collector());
        assert_eq!(
            config.services[1].sink,
            SinkConfig::ObjectStore {
                bucket: "logs".into(),
                prefix: String::new()
            }
        );
        assert_eq!(config.services[1].lines_per_request, 5);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
