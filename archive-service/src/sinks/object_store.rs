use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use aws_config::BehaviorVersion;
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream, Client};

use crate::config::StorageConfig;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("put s3://{bucket}/{key} failed: {message}")]
    Put {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Single-shot object writes. A put replaces any object already at `key`.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;
}

/// S3 (or S3-compatible) backend.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS credential chain, scoped to the
    /// configured profile and endpoint when set.
    pub async fn from_config(cfg: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &cfg.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &cfg.endpoint_url {
            if endpoint.starts_with("http://") {
                tracing::warn!(endpoint = %endpoint, "object storage endpoint is not using TLS");
            }
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(cfg.force_path_style)
            .build();

        Self::new(Client::from_conf(s3_config))
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/gzip")
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })
    }
}

/// Process-local store keyed by (bucket, key). Clones share contents.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock().get(&(bucket.to_string(), key.to_string())).cloned()
    }

    /// Keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.lock().insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}
