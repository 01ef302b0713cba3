//! Remote content store contract and backends
//!
//! A store is addressed by `(container, path)`. Containers map to S3 buckets
//! (or file shares); paths are `/`-separated keys inside them.

mod memory;
#[cfg(feature = "cloud")]
mod s3;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PageDetails, RawFile};

pub use memory::{MemoryStore, StoreOperation};
#[cfg(feature = "cloud")]
pub use s3::S3Store;

/// Operations the watcher and the page server need from remote storage
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a UTF-8 file. Missing container or file yields [`PageDetails::missing`].
    async fn get_text_file(&self, container: &str, path: &str) -> Result<PageDetails>;

    /// Read a binary file. Missing container or file yields [`RawFile::empty`].
    async fn get_raw_file(&self, container: &str, path: &str) -> Result<RawFile>;

    /// Every file key in the container, recursively, optionally under a prefix
    async fn list_files(&self, container: &str, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Create or overwrite `sub_path/filename`, returning the entity tag
    async fn upload_file(&self, file: &RawFile, container: &str, sub_path: &str)
        -> Result<String>;

    /// Remove one file, returning how many objects were removed (0 or 1)
    async fn delete_file(&self, container: &str, path: &str) -> Result<u64>;
}

/// Trim separators and whitespace the way every store key is normalized
pub fn trim_key(key: &str) -> &str {
    key.trim_matches(|c: char| c == '/' || c == '\\' || c.is_whitespace())
}

/// Join an upload sub path and a filename into a store key
pub fn object_key(sub_path: &str, filename: &str) -> String {
    let filename = trim_key(filename);
    let sub_path = trim_key(sub_path);
    if sub_path.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", sub_path, filename)
    }
}
