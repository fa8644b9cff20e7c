//! Ships dirty buffers to their sink.
//!
//! A clean buffer is left untouched. A dirty one is written to its rotating
//! file, uploaded as one object, or forwarded line by line to a collector;
//! on success the shipped bytes are removed and the buffer becomes clean.
//! Every attempt ends with one timing line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferKey, LogBuffer};
use crate::config::{FlushLogConfig, SinkConfig};
use crate::error::{FlushError, ObjectStoreError};
use crate::logger::Logger;
use crate::rotation::FileRotation;
use crate::sink::{CollectorConnector, FluentConnector, HttpObjectStore, ObjectStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub bytes: usize,
    pub records: usize,
    /// Lines that were not valid JSON objects (collector sink only).
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was reported, nothing was shipped.
    Clean,
    Flushed(FlushStats),
}

/// A failed transfer and how many leading bytes were shipped before it.
type Partial = (usize, FlushError);

pub struct Flusher {
    rotation: Arc<FileRotation>,
    object_store: Option<Arc<dyn ObjectStore>>,
    connector: Arc<dyn CollectorConnector>,
    remote_timeout: Duration,
}

impl Flusher {
    pub fn new(rotation: FileRotation) -> Self {
        Self {
            rotation: Arc::new(rotation),
            object_store: None,
            connector: Arc::new(FluentConnector),
            remote_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &FlushLogConfig) -> Result<Self, ObjectStoreError> {
        let mut flusher = Self::new(FileRotation::new(config.max_files))
            .with_remote_timeout(config.remote_timeout());
        if let Some(store) = &config.object_store {
            let store = HttpObjectStore::new(store, config.remote_timeout())?;
            flusher = flusher.with_object_store(Arc::new(store));
        }
        Ok(flusher)
    }

    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn CollectorConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Deadline applied to each remote call (upload, connect, post).
    #[must_use]
    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    pub fn rotation(&self) -> &FileRotation {
        &self.rotation
    }

    /// Ship `buffer` if an error was reported against it.
    ///
    /// Flushes of the same buffer never overlap: a second call waits for the
    /// first and then usually finds the buffer clean. On failure the unshipped
    /// content stays in the buffer and it stays dirty.
    pub async fn flush(&self, buffer: &LogBuffer) -> Result<FlushOutcome, FlushError> {
        let _in_flight = buffer.flush_lock.lock().await;
        let key = buffer.key();

        if !buffer.is_dirty() {
            info!(
                component = %key.component,
                sub_label = %key.sub_label,
                "Buffer cleared without flushing"
            );
            return Ok(FlushOutcome::Clean);
        }

        let start = Instant::now();
        let content = buffer.snapshot();
        let result = match buffer.sink() {
            SinkConfig::File { base_path } => {
                let path = PathBuf::from(key.log_name(base_path));
                self.write_file(path, content).await.map_err(|e| (0, e))
            }
            SinkConfig::ObjectStore { bucket, prefix } => self
                .upload(bucket, &key.log_name(prefix), content)
                .await
                .map_err(|e| (0, e)),
            SinkConfig::Collector { host, port } => {
                self.forward(key, host, *port, &content).await
            }
        };
        let elapsed = start.elapsed();

        match result {
            Ok(stats) => {
                buffer.consume(stats.bytes);
                buffer.mark_clean();
                info!(
                    component = %key.component,
                    sub_label = %key.sub_label,
                    sink = buffer.sink().kind(),
                    bytes = stats.bytes,
                    records = stats.records,
                    skipped = stats.skipped,
                    "Flushing took: {elapsed:?}"
                );
                Ok(FlushOutcome::Flushed(stats))
            }
            Err((shipped, err)) => {
                buffer.consume(shipped);
                error!(
                    component = %key.component,
                    sub_label = %key.sub_label,
                    sink = buffer.sink().kind(),
                    bytes = shipped,
                    error = %err,
                    "Flush failed after {elapsed:?}"
                );
                Err(err)
            }
        }
    }

    /// Report `err`, flush, then exit the process with status 1.
    ///
    /// The flush always runs first; if it fails, the failure is logged and the
    /// process exits anyway.
    pub async fn fatal_flush(
        &self,
        logger: &Logger,
        msg: &str,
        err: &(dyn std::error::Error + Send + Sync),
    ) {
        self.flush_before_exit(logger, msg, err).await;
        std::process::exit(1)
    }

    /// Report `err`, flush, then panic with `msg`.
    pub async fn panic_flush(
        &self,
        logger: &Logger,
        msg: &str,
        err: &(dyn std::error::Error + Send + Sync),
    ) {
        self.flush_before_exit(logger, msg, err).await;
        panic!("{msg}: {err}");
    }

    async fn flush_before_exit(
        &self,
        logger: &Logger,
        msg: &str,
        err: &(dyn std::error::Error + Send + Sync),
    ) {
        logger.report_error(msg, err, None);
        if let Err(flush_err) = self.flush(logger.buffer()).await {
            error!(error = %flush_err, "Flush before termination failed");
        }
        error!("{msg}: {err}");
    }

    async fn write_file(&self, path: PathBuf, content: Vec<u8>) -> Result<FlushStats, FlushError> {
        let stats = FlushStats {
            bytes: content.len(),
            records: count_records(&content),
            skipped: 0,
        };
        let rotation = Arc::clone(&self.rotation);
        let action =
            tokio::task::spawn_blocking(move || rotation.write(&path, &content)).await??;
        debug!(?action, "Wrote log file");
        Ok(stats)
    }

    async fn upload(&self, bucket: &str, key: &str, content: Vec<u8>) -> Result<FlushStats, FlushError> {
        let store = self
            .object_store
            .as_ref()
            .ok_or(FlushError::SinkUnavailable("object store"))?;
        let stats = FlushStats {
            bytes: content.len(),
            records: count_records(&content),
            skipped: 0,
        };
        timeout(self.remote_timeout, store.upload(bucket, key, content))
            .await
            .map_err(|_| FlushError::Timeout(self.remote_timeout))??;
        Ok(stats)
    }

    /// One connection per flush; malformed lines are skipped, the first
    /// transport failure stops the flush.
    async fn forward(
        &self,
        key: &BufferKey,
        host: &str,
        port: u16,
        content: &[u8],
    ) -> Result<FlushStats, Partial> {
        let tag = key.tag();
        let mut forwarder = match timeout(self.remote_timeout, self.connector.connect(host, port)).await {
            Ok(Ok(forwarder)) => forwarder,
            Ok(Err(source)) => {
                let address = format!("{host}:{port}");
                return Err((0, FlushError::Connect { address, source }));
            }
            Err(_) => return Err((0, FlushError::Timeout(self.remote_timeout))),
        };

        let mut stats = FlushStats::default();
        for line in content.split_inclusive(|b| *b == b'\n') {
            let text = line.trim_ascii();
            if text.is_empty() {
                stats.bytes += line.len();
                continue;
            }
            let record: Map<String, Value> = match serde_json::from_slice(text) {
                Ok(record) => record,
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Unmarshalling error, skipping log line");
                    stats.skipped += 1;
                    stats.bytes += line.len();
                    continue;
                }
            };

            let posted = match timeout(self.remote_timeout, forwarder.post(&tag, record)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(FlushError::Forward {
                    tag: tag.clone(),
                    sent: stats.records,
                    source,
                }),
                Err(_) => Err(FlushError::Timeout(self.remote_timeout)),
            };
            if let Err(e) = posted {
                let _ = timeout(self.remote_timeout, forwarder.close()).await;
                return Err((stats.bytes, e));
            }
            stats.records += 1;
            stats.bytes += line.len();
        }

        match timeout(self.remote_timeout, forwarder.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tag = %tag, error = %e, "Closing collector connection failed"),
            Err(_) => warn!(tag = %tag, "Closing collector connection timed out"),
        }
        Ok(stats)
    }
}

fn count_records(content: &[u8]) -> usize {
    content
        .split(|b| *b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
        .count()
}
