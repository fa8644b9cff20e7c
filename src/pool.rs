//! Bounded, keyed collection of log buffers.
//!
//! At most one buffer lives per `(component, sub_label)` key. When the pool is
//! full, inserting a new key evicts the oldest *inserted* entry (FIFO, not
//! LRU). Evicted buffers are not flushed: whatever they held is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::buffer::{BufferKey, LogBuffer};
use crate::config::{Console, FlushLogConfig, SinkConfig};
use crate::logger::Logger;

struct Entry {
    key: BufferKey,
    buffer: Arc<LogBuffer>,
    logger: Logger,
}

struct PoolState {
    entries: VecDeque<Entry>,
    capacity: usize,
}

impl PoolState {
    fn position(&self, key: &BufferKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }
}

pub struct BufferPool {
    state: Mutex<PoolState>,
    console: Console,
}

impl BufferPool {
    pub fn new(capacity: usize, console: Console) -> Self {
        Self {
            state: Mutex::new(PoolState {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
            console,
        }
    }

    pub fn from_config(config: &FlushLogConfig) -> Self {
        Self::new(config.max_buffers, config.console)
    }

    /// Return the buffer for `key`, creating it bound to `sink` if absent.
    ///
    /// `sink` is ignored when the key already exists.
    pub fn get_or_create(
        &self,
        key: BufferKey,
        sink: SinkConfig,
    ) -> (Arc<LogBuffer>, Logger) {
        let mut state = self.lock();

        if let Some(i) = state.position(&key) {
            warn!(component = %key.component, sub_label = %key.sub_label, "Buffer already exists, returning existing buffer");
            let entry = &state.entries[i];
            return (Arc::clone(&entry.buffer), entry.logger.clone());
        }

        let buffer = Arc::new(LogBuffer::new(key.clone(), sink));
        let logger = Logger::new(Arc::clone(&buffer), self.console);

        while state.capacity > 0 && state.entries.len() >= state.capacity {
            if let Some(evicted) = state.entries.pop_front() {
                debug!(
                    component = %evicted.key.component,
                    sub_label = %evicted.key.sub_label,
                    dropped_bytes = evicted.buffer.len(),
                    "Evicting oldest buffer"
                );
            }
        }
        if state.capacity > 0 {
            state.entries.push_back(Entry {
                key,
                buffer: Arc::clone(&buffer),
                logger: logger.clone(),
            });
        }

        (buffer, logger)
    }

    pub fn find(&self, key: &BufferKey) -> Option<(Arc<LogBuffer>, Logger)> {
        let state = self.lock();
        state.position(key).map(|i| {
            let entry = &state.entries[i];
            (Arc::clone(&entry.buffer), entry.logger.clone())
        })
    }

    pub fn find_buffer(&self, key: &BufferKey) -> Option<Arc<LogBuffer>> {
        self.find(key).map(|(buffer, _)| buffer)
    }

    pub fn find_logger(&self, key: &BufferKey) -> Option<Logger> {
        self.find(key).map(|(_, logger)| logger)
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.lock().position(key).is_some()
    }

    /// Change the capacity for later inserts. Existing entries are kept even
    /// when they exceed the new capacity; the next insert trims them.
    pub fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> Vec<BufferKey> {
        self.lock().entries.iter().map(|e| e.key.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sink() -> SinkConfig {
        SinkConfig::File {
            base_path: "/tmp/".into(),
        }
    }

    fn key(n: usize) -> BufferKey {
        BufferKey::new("svc", format!("k{n}"))
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let pool = BufferPool::new(4, Console::Silent);
        let (a, _) = pool.get_or_create(key(1), sink());
        let (b, _) = pool.get_or_create(key(1), SinkConfig::default_collector());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
        assert_eq!(b.sink(), &sink());
    }

    #[test]
    fn evicts_oldest_inserted_when_full() {
        let pool = BufferPool::new(2, Console::Silent);
        pool.get_or_create(key(1), sink());
        pool.get_or_create(key(2), sink());
        // touching k1 does not refresh it: eviction is by insertion order
        pool.get_or_create(key(1), sink());
        pool.get_or_create(key(3), sink());

        assert!(pool.find(&key(1)).is_none());
        assert!(pool.find(&key(2)).is_some());
        assert!(pool.find(&key(3)).is_some());
        assert_eq!(pool.keys(), vec![key(2), key(3)]);
    }

    #[test]
    fn eviction_drops_unflushed_content() {
        let pool = BufferPool::new(1, Console::Silent);
        let (_, logger) = pool.get_or_create(key(1), sink());
        logger.error("lost forever");
        logger.buffer().mark_dirty();

        pool.get_or_create(key(2), sink());
        let (fresh, _) = pool.get_or_create(key(1), sink());

        assert!(fresh.is_empty());
        assert!(!fresh.is_dirty());
    }

    #[test]
    fn never_exceeds_capacity() {
        let pool = BufferPool::new(3, Console::Silent);
        for n in 0..50 {
            pool.get_or_create(key(n % 7), sink());
            assert!(pool.len() <= 3);
        }
    }

    #[test]
    fn find_distinguishes_absent_from_empty() {
        let pool = BufferPool::new(2, Console::Silent);
        assert!(pool.find_buffer(&key(1)).is_none());
        pool.get_or_create(key(1), sink());
        let found = pool.find_buffer(&key(1)).unwrap();
        assert!(found.is_empty());
        assert!(pool.find_logger(&key(1)).is_some());
    }

    #[test]
    fn shrinking_capacity_is_not_retroactive() {
        let pool = BufferPool::new(3, Console::Silent);
        for n in 0..3 {
            pool.get_or_create(key(n), sink());
        }
        pool.set_capacity(1);
        assert_eq!(pool.len(), 3);

        pool.get_or_create(key(9), sink());
        assert_eq!(pool.keys(), vec![key(9)]);
    }

    #[test]
    fn concurrent_creates_share_one_entry() {
        let pool = Arc::new(BufferPool::new(8, Console::Silent));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.get_or_create(key(1), sink()).0)
            })
            .collect();
        let buffers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(pool.len(), 1);
        assert!(buffers.iter().all(|b| Arc::ptr_eq(b, &buffers[0])));
    }
}
