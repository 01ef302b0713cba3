//! In-memory content store
//!
//! Used by tests and local development. Keeps a log of every mutating call so
//! callers can assert on what reached the store and in which order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{object_key, trim_key, ContentStore};
use crate::error::{CmsError, Result};
use crate::mime;
use crate::types::{PageDetails, RawFile};

/// A mutating call that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Upload { container: String, key: String },
    Delete { container: String, key: String },
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Content store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    operations: RwLock<Vec<StoreOperation>>,
    reject_uploads: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one empty container already created
    pub fn with_container(container: &str) -> Self {
        let store = Self::new();
        store.create_container(container);
        store
    }

    /// Delay every upload and delete, to widen race windows in tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn create_container(&self, container: &str) {
        self.containers
            .write()
            .entry(container.trim().to_string())
            .or_default();
    }

    /// Make every subsequent upload fail as if the remote refused it
    pub fn set_reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }

    /// Seed a file without recording an operation
    pub fn insert(&self, container: &str, key: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let key = trim_key(key).to_string();
        let object = StoredObject {
            content_type: mime::content_type_for(&key).to_string(),
            etag: compute_etag(&data),
            data,
            last_modified: Utc::now(),
        };
        self.containers
            .write()
            .entry(container.trim().to_string())
            .or_default()
            .insert(key, object);
    }

    /// Raw bytes of a stored file
    pub fn get(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.containers
            .read()
            .get(container.trim())
            .and_then(|files| files.get(trim_key(key)))
            .map(|object| object.data.clone())
    }

    /// Entity tag of a stored file
    pub fn etag(&self, container: &str, key: &str) -> Option<String> {
        self.containers
            .read()
            .get(container.trim())
            .and_then(|files| files.get(trim_key(key)))
            .map(|object| object.etag.clone())
    }

    pub fn contains(&self, container: &str, key: &str) -> bool {
        self.get(container, key).is_some()
    }

    /// Every mutating call so far, oldest first
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.operations.read().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.operations
            .read()
            .iter()
            .filter(|op| matches!(op, StoreOperation::Upload { .. }))
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.operations
            .read()
            .iter()
            .filter(|op| matches!(op, StoreOperation::Delete { .. }))
            .count()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn compute_etag(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_text_file(&self, container: &str, path: &str) -> Result<PageDetails> {
        let key = trim_key(path);
        if container.trim().is_empty() || key.is_empty() {
            return Ok(PageDetails::missing(key));
        }

        let containers = self.containers.read();
        let Some(object) = containers
            .get(container.trim())
            .and_then(|files| files.get(key))
        else {
            return Ok(PageDetails::missing(key));
        };

        let content = String::from_utf8_lossy(&object.data).into_owned();
        Ok(PageDetails::new(key, content, object.last_modified))
    }

    async fn get_raw_file(&self, container: &str, path: &str) -> Result<RawFile> {
        let key = trim_key(path);
        let containers = self.containers.read();
        let Some(object) = containers
            .get(container.trim())
            .and_then(|files| files.get(key))
        else {
            return Ok(RawFile::empty());
        };

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        Ok(RawFile {
            filename,
            content_type: object.content_type.clone(),
            data: object.data.clone(),
        })
    }

    async fn list_files(&self, container: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let prefix = prefix.map(trim_key).unwrap_or_default();
        let containers = self.containers.read();
        let Some(files) = containers.get(container.trim()) else {
            return Ok(Vec::new());
        };

        Ok(files
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn upload_file(
        &self,
        file: &RawFile,
        container: &str,
        sub_path: &str,
    ) -> Result<String> {
        if !file.is_valid() {
            return Err(CmsError::UploadRejected(format!(
                "file '{}' has no name or no content",
                file.filename
            )));
        }

        self.simulate_latency().await;

        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(CmsError::UploadRejected(format!(
                "store refused '{}'",
                file.filename
            )));
        }

        let key = object_key(sub_path, &file.filename);
        let etag = compute_etag(&file.data);
        {
            let mut containers = self.containers.write();
            let files = containers
                .get_mut(container.trim())
                .ok_or_else(|| CmsError::ContainerNotFound(container.to_string()))?;
            files.insert(
                key.clone(),
                StoredObject {
                    data: file.data.clone(),
                    content_type: file.content_type.clone(),
                    etag: etag.clone(),
                    last_modified: Utc::now(),
                },
            );
        }

        self.operations.write().push(StoreOperation::Upload {
            container: container.trim().to_string(),
            key,
        });
        Ok(etag)
    }

    async fn delete_file(&self, container: &str, path: &str) -> Result<u64> {
        self.simulate_latency().await;

        let key = trim_key(path).to_string();
        let removed = {
            let mut containers = self.containers.write();
            let files = containers
                .get_mut(container.trim())
                .ok_or_else(|| CmsError::ContainerNotFound(container.to_string()))?;
            files.remove(&key).map_or(0, |_| 1)
        };

        self.operations.write().push(StoreOperation::Delete {
            container: container.trim().to_string(),
            key,
        });
        Ok(removed)
    }
}
