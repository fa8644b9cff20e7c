use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while shipping a buffer to its sink.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("failed to connect to collector at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("forwarding to '{tag}' failed after {sent} records: {source}")]
    Forward {
        tag: String,
        sent: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no {0} client configured")]
    SinkUnavailable(&'static str),

    #[error("blocking write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} for key '{key}'")]
    Status { status: u16, key: String },

    #[error("object '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
