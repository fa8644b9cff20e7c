//! End-to-end behaviour of pool, flusher and sinks through the public API.

use std::sync::Arc;

use flushlog::sink::{MemoryObjectStore, ObjectStore};
use flushlog::{BufferKey, BufferPool, Console, FileRotation, FlushOutcome, Flusher, SinkConfig};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

fn key(label: &str) -> BufferKey {
    BufferKey::new("worker", label)
}

#[test]
fn pool_of_two_evicts_first_key() {
    let pool = BufferPool::new(2, Console::Silent);
    let sink = SinkConfig::default_collector();

    pool.get_or_create(key("k1"), sink.clone());
    pool.get_or_create(key("k2"), sink.clone());
    pool.get_or_create(key("k3"), sink);

    assert!(pool.find(&key("k1")).is_none());
    assert!(pool.find(&key("k2")).is_some());
    assert!(pool.find(&key("k3")).is_some());
}

#[tokio::test]
async fn rotation_recycles_oldest_file_across_flushes() {
    let dir = TempDir::new().unwrap();
    let base_path = format!("{}/", dir.path().display());
    let pool = BufferPool::new(10, Console::Silent);
    let flusher = Flusher::new(FileRotation::new(2));
    let err = std::io::Error::other("failed");

    for label in ["a", "b", "c"] {
        let (buffer, logger) = pool.get_or_create(
            key(label),
            SinkConfig::File {
                base_path: base_path.clone(),
            },
        );
        logger.report_error(&format!("job {label}"), &err, None);
        flusher.flush(&buffer).await.unwrap();
    }

    let registered = flusher.rotation().registered();
    assert_eq!(
        registered,
        vec![dir.path().join("workerb.log"), dir.path().join("workerc.log")]
    );
    assert!(!dir.path().join("workera.log").exists());
    let c = std::fs::read_to_string(dir.path().join("workerc.log")).unwrap();
    assert!(c.contains("job c"));
    assert!(!c.contains("job a"));
}

#[tokio::test]
async fn second_flush_of_same_key_appends() {
    let dir = TempDir::new().unwrap();
    let sink = SinkConfig::File {
        base_path: format!("{}/", dir.path().display()),
    };
    let pool = BufferPool::new(10, Console::Silent);
    let flusher = Flusher::new(FileRotation::new(5));
    let (buffer, logger) = pool.get_or_create(key("x"), sink);
    let err = std::io::Error::other("again");

    logger.report_error("first", &err, None);
    let first_len = buffer.len();
    flusher.flush(&buffer).await.unwrap();
    logger.report_error("second", &err, None);
    let second_len = buffer.len();
    flusher.flush(&buffer).await.unwrap();

    let size = std::fs::metadata(dir.path().join("workerx.log")).unwrap().len() as usize;
    assert!(size >= first_len + second_len);
}

#[tokio::test]
async fn collector_receives_valid_lines_and_skips_broken_one() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let collector = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let mut messages = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            messages.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        messages
    });

    let pool = BufferPool::new(4, Console::Silent);
    let flusher = Flusher::new(FileRotation::new(2));
    let (buffer, _) = pool.get_or_create(
        key("job-1"),
        SinkConfig::Collector {
            host: "127.0.0.1".into(),
            port,
        },
    );
    buffer.append(format!("{}\n", json!({"msg": "one"})).as_bytes());
    buffer.append(b"{\"msg\": broken\n");
    buffer.append(format!("{}\n", json!({"msg": "three"})).as_bytes());
    buffer.mark_dirty();

    let outcome = flusher.flush(&buffer).await.unwrap();

    let FlushOutcome::Flushed(stats) = outcome else {
        panic!("expected a flush, got {outcome:?}");
    };
    assert_eq!((stats.records, stats.skipped), (2, 1));
    let messages = collector.await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0][0], "worker.job-1");
    assert_eq!(messages[1][2]["msg"], "three");
    assert!(buffer.is_empty());
    assert!(!buffer.is_dirty());
}

#[tokio::test]
async fn evicted_buffer_is_never_shipped() {
    let store = Arc::new(MemoryObjectStore::new());
    let flusher = Flusher::new(FileRotation::new(2)).with_object_store(store.clone());
    let pool = BufferPool::new(1, Console::Silent);
    let sink = SinkConfig::ObjectStore {
        bucket: "b".into(),
        prefix: String::new(),
    };

    let (_, logger) = pool.get_or_create(key("old"), sink.clone());
    logger.report_error("lost", &std::io::Error::other("x"), None);
    pool.get_or_create(key("new"), sink);

    let found = pool.find_buffer(&key("old"));
    assert!(found.is_none());
    assert!(store.is_empty());
    assert!(store.download("b", "workerold.log").await.is_err());
}
