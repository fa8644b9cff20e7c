//! Error-gated log buffering.
//!
//! Components log into a per-key in-memory buffer obtained from a
//! [`BufferPool`]. Nothing leaves the process until an error is reported
//! against the buffer; [`Flusher::flush`] then ships it to a rotating local
//! file, an object store, or a forward-protocol log collector.

pub mod buffer;
pub mod config;
pub mod error;
pub mod flush;
pub mod log_entry;
pub mod logger;
pub mod pool;
pub mod rotation;
pub mod simulator;
pub mod sink;

pub use buffer::{BufferKey, LogBuffer};
pub use config::{Console, FlushLogConfig, SinkConfig};
pub use error::{ConfigError, FlushError, ObjectStoreError};
pub use flush::{FlushOutcome, FlushStats, Flusher};
pub use log_entry::{LogEntry, LogLevel};
pub use logger::Logger;
pub use pool::BufferPool;
pub use rotation::{FileBackend, FileRotation, LocalFiles, RotationAction};
