//! Remote destinations a flush can ship to.
//!
//! Both are reached only through the flusher: `ObjectStore` receives a whole
//! buffer as one object, a `Forwarder` receives one record at a time over a
//! connection opened by a `CollectorConnector` for the duration of a flush.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ObjectStoreError;

pub mod collector;
pub mod object_store;

pub use collector::{FluentConnector, FluentForwarder};
pub use object_store::{HttpObjectStore, MemoryObjectStore, detect_content_type};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` privately under `bucket/key`, replacing any previous object.
    async fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError>;

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

#[async_trait]
pub trait Forwarder: Send {
    async fn post(&mut self, tag: &str, record: Map<String, Value>) -> std::io::Result<()>;

    async fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait CollectorConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<Box<dyn Forwarder>>;
}
