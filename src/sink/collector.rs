//! Fluent forward-protocol client in JSON mode.
//!
//! Each record goes out as `[tag, unix_seconds, record]` followed by a newline.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::sink::{CollectorConnector, Forwarder};

#[derive(Debug, Default, Clone, Copy)]
pub struct FluentConnector;

#[async_trait]
impl CollectorConnector for FluentConnector {
    async fn connect(&self, host: &str, port: u16) -> std::io::Result<Box<dyn Forwarder>> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(FluentForwarder::new(stream)))
    }
}

pub struct FluentForwarder {
    stream: BufWriter<TcpStream>,
}

impl FluentForwarder {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
        }
    }

    pub fn encode(tag: &str, record: Map<String, Value>) -> Vec<u8> {
        let mut message = json!([tag, Utc::now().timestamp(), Value::Object(record)]).to_string();
        message.push('\n');
        message.into_bytes()
    }
}

#[async_trait]
impl Forwarder for FluentForwarder {
    async fn post(&mut self, tag: &str, record: Map<String, Value>) -> std::io::Result<()> {
        let message = Self::encode(tag, record);
        self.stream.write_all(&message).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn encodes_forward_message() {
        let mut record = Map::new();
        record.insert("msg".into(), json!("boom"));
        let bytes = FluentForwarder::encode("api.req-1", record);

        assert_eq!(bytes.last(), Some(&b'\n'));
        let message: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(message[0], "api.req-1");
        assert!(message[1].is_i64());
        assert_eq!(message[2]["msg"], "boom");
    }

    #[tokio::test]
    async fn posts_one_line_per_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                received.push(serde_json::from_str::<Value>(&line).unwrap());
            }
            received
        });

        let mut forwarder = FluentConnector.connect("127.0.0.1", port).await.unwrap();
        for n in 0..3 {
            let mut record = Map::new();
            record.insert("n".into(), json!(n));
            forwarder.post("svc.a", record).await.unwrap();
        }
        forwarder.close().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2][2]["n"], 2);
    }

    #[tokio::test]
    async fn connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(FluentConnector.connect("127.0.0.1", port).await.is_err());
    }
}
