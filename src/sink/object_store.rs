use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;

use crate::config::ObjectStoreConfig;
use crate::error::ObjectStoreError;
use crate::sink::ObjectStore;

/// Sniff a content type from the first bytes of a body.
///
/// Only the cases a log buffer can realistically hold are recognised;
/// anything else that looks like text is `text/plain`.
pub fn detect_content_type(body: &[u8]) -> &'static str {
    let head = &body[..body.len().min(512)];
    if head.starts_with(&[0x1f, 0x8b, 0x08]) {
        return "application/x-gzip";
    }
    if head.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    let binary = head
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f));
    if binary {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}

/// S3-compatible object store reached over plain HTTP(S), path-style
/// (`{endpoint}/{bucket}/{key}`).
///
/// Request signing is left to whatever sits at `endpoint` (a signing proxy or
/// a gateway accepting the optional bearer token).
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(config: &ObjectStoreConfig, timeout: Duration) -> Result<Self, ObjectStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        let content_type = detect_content_type(&body);
        let length = body.len();
        let request = self
            .client
            .put(self.url(bucket, key))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_DISPOSITION, "attachment")
            .header("x-amz-acl", "private")
            .header("x-amz-server-side-encryption", "AES256")
            .body(body);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ObjectStoreError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }
        debug!(bucket, key, length, content_type, "Uploaded log object");
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let response = self
            .authorize(self.client.get(self.url(bucket, key)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ObjectStoreError::NotFound(key.to_string())),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => Err(ObjectStoreError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// In-process object store, handy for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        let object = StoredObject {
            content_type: detect_content_type(&body),
            body,
        };
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((bucket.to_string(), key.to_string()), object);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.get(bucket, key)
            .map(|o| o.body)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }
}
