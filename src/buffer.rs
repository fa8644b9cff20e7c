use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::SinkConfig;

/// Identifies the owner of a buffer: a component and a free-form sub label
/// (request id, job id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub component: String,
    pub sub_label: String,
}

impl BufferKey {
    pub fn new(component: impl Into<String>, sub_label: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            sub_label: sub_label.into(),
        }
    }

    /// `<prefix><component><sub_label>.log`, shared by files and object keys.
    pub fn log_name(&self, prefix: &str) -> String {
        format!("{}{}{}.log", prefix, self.component, self.sub_label)
    }

    /// Tag used when forwarding records to a collector.
    pub fn tag(&self) -> String {
        format!("{}.{}", self.component, self.sub_label)
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.sub_label)
    }
}

/// Append-only log bytes for one component instance plus its error flag.
///
/// Content is only shipped when the buffer is dirty, i.e. an error was
/// reported since the last successful flush.
pub struct LogBuffer {
    key: BufferKey,
    sink: SinkConfig,
    content: Mutex<Vec<u8>>,
    dirty: AtomicBool,
    // held for the whole duration of a flush
    pub(crate) flush_lock: tokio::sync::Mutex<()>,
}

impl LogBuffer {
    pub fn new(key: BufferKey, sink: SinkConfig) -> Self {
        Self {
            key,
            sink,
            content: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    pub fn sink(&self) -> &SinkConfig {
        &self.sink
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn append(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current content.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Drop the first `n` bytes, keeping anything appended after them.
    pub(crate) fn consume(&self, n: usize) {
        let mut content = self.lock();
        let n = n.min(content.len());
        content.drain(..n);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("key", &self.key)
            .field("sink", &self.sink.kind())
            .field("len", &self.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> LogBuffer {
        LogBuffer::new(
            BufferKey::new("auth", "req-1"),
            SinkConfig::File {
                base_path: "/tmp/".into(),
            },
        )
    }

    #[test]
    fn names_follow_component_and_label() {
        let key = BufferKey::new("auth", "req-1");
        assert_eq!(key.log_name("/var/log/"), "/var/log/authreq-1.log");
        assert_eq!(key.tag(), "auth.req-1");
    }

    #[test]
    fn consume_keeps_the_tail() {
        let buf = buffer();
        buf.append(b"hello ");
        buf.append(b"world");
        buf.consume(6);
        assert_eq!(buf.snapshot(), b"world");
        buf.consume(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn starts_clean() {
        let buf = buffer();
        assert!(!buf.is_dirty());
        buf.mark_dirty();
        assert!(buf.is_dirty());
        buf.mark_clean();
        assert!(!buf.is_dirty());
    }
}
