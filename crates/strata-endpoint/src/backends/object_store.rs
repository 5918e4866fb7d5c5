//! Object-storage client seam used by the `s3` backend.
//!
//! A store is a flat key space inside one bucket. [`ObjectStoreConnector`]
//! builds a store from parsed credentials; the workspace ships an in-memory
//! pair for tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use strata_core::ObjectStoreConfig;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::content_etag;
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{reader_from_bytes, NodeReader};

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Minimal object-storage client.
///
/// Missing keys are reported as `EndpointError::Delegate` with code 404.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn stat(&self, key: &str) -> EndpointResult<ObjectInfo>;

    /// Every object whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> EndpointResult<Vec<ObjectInfo>>;

    async fn put(&self, key: &str, reader: NodeReader, size: u64) -> EndpointResult<ObjectInfo>;

    async fn get(&self, key: &str) -> EndpointResult<NodeReader>;

    /// Server-side copy.
    async fn copy(&self, from: &str, to: &str) -> EndpointResult<()>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> EndpointResult<()>;
}

/// Builds stores from connection parameters.
pub trait ObjectStoreConnector: Send + Sync {
    fn connect(&self, config: &ObjectStoreConfig) -> EndpointResult<Arc<dyn ObjectStore>>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Object store held in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, (ObjectInfo, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    fn insert(&self, key: &str, content: Vec<u8>) -> ObjectInfo {
        let info = ObjectInfo {
            key: key.to_string(),
            size: content.len() as u64,
            etag: content_etag(&content),
            last_modified: Some(Utc::now()),
        };
        self.objects.write().insert(key.to_string(), (info.clone(), content));
        info
    }
}

fn missing(key: &str) -> EndpointError {
    EndpointError::delegate(404, format!("no such key: {}", key))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn stat(&self, key: &str) -> EndpointResult<ObjectInfo> {
        self.objects
            .read()
            .get(key)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| missing(key))
    }

    async fn list(&self, prefix: &str) -> EndpointResult<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, (info, _))| info.clone())
            .collect())
    }

    async fn put(&self, key: &str, mut reader: NodeReader, size: u64) -> EndpointResult<ObjectInfo> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;
        if content.len() as u64 != size {
            return Err(EndpointError::delegate(
                400,
                format!("{}: expected {} bytes, received {}", key, size, content.len()),
            ));
        }
        debug!(key = %key, size, "Stored object");
        Ok(self.insert(key, content))
    }

    async fn get(&self, key: &str) -> EndpointResult<NodeReader> {
        self.objects
            .read()
            .get(key)
            .map(|(_, content)| reader_from_bytes(content.clone()))
            .ok_or_else(|| missing(key))
    }

    async fn copy(&self, from: &str, to: &str) -> EndpointResult<()> {
        let content = self
            .objects
            .read()
            .get(from)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| missing(from))?;
        self.insert(to, content);
        Ok(())
    }

    async fn remove(&self, key: &str) -> EndpointResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }
}

/// Connector handing out one in-memory store per bucket.
#[derive(Debug, Default)]
pub struct MemoryObjectStoreConnector {
    buckets: Mutex<HashMap<String, Arc<MemoryObjectStore>>>,
}

impl MemoryObjectStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store behind `bucket`, if a connection created it.
    pub fn bucket(&self, bucket: &str) -> Option<Arc<MemoryObjectStore>> {
        self.buckets.lock().get(bucket).cloned()
    }
}

impl ObjectStoreConnector for MemoryObjectStoreConnector {
    fn connect(&self, config: &ObjectStoreConfig) -> EndpointResult<Arc<dyn ObjectStore>> {
        config.validate()?;
        let store: Arc<dyn ObjectStore> = self
            .buckets
            .lock()
            .entry(config.bucket.clone())
            .or_default()
            .clone();
        Ok(store)
    }
}
