//! Configuration for the watcher, the page server and the content store
//!
//! Everything lives in one optional TOML file:
//!
//! ```toml
//! [watcher]
//! local_root = "~/Sites/Blog"
//! container = "cms"
//! pages_dir = "page"
//!
//! [site]
//! default_home = "index"
//!
//! [store]
//! endpoint = "http://localhost:9000"
//! ```
//!
//! Command-line flags override whatever the file sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CmsError, Result};

/// Default quiet interval for repeat events on the same file
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Default time in-flight syncs get to finish at shutdown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsConfig {
    pub watcher: WatcherConfig,
    pub site: SiteConfig,
    pub store: StoreConfig,
}

impl CmsConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read the config file, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let expanded = expand_path(path);
        let text = std::fs::read_to_string(&expanded).map_err(|e| {
            CmsError::Config(format!(
                "cannot read config file {}: {}",
                expanded.display(),
                e
            ))
        })?;
        Self::from_toml(&text)
    }
}

/// Settings for the folder watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Local directory tree to mirror
    pub local_root: Option<PathBuf>,
    /// Remote container (bucket or share) receiving the files
    pub container: String,
    /// Local pages folder; the remote store keeps pages at its root
    pub pages_dir: String,
    pub images_dir: String,
    pub layouts_dir: String,
    /// Filename fragments that never sync
    pub exclusions: Vec<String>,
    pub debounce_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            local_root: None,
            container: "cms".to_string(),
            pages_dir: "page".to_string(),
            images_dir: "images".to_string(),
            layouts_dir: "layouts".to_string(),
            exclusions: vec!["DS_Store".to_string(), "log_".to_string()],
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl WatcherConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Resolve the watched root, failing if it is unset or not a directory
    pub fn validate(&self) -> Result<PathBuf> {
        let root = self
            .local_root
            .as_deref()
            .ok_or_else(|| CmsError::Config("a local root to watch is required".to_string()))?;
        let root = expand_path(root);

        if !root.is_dir() {
            return Err(CmsError::Config(format!(
                "path to watch does not exist or is not a directory: {}",
                root.display()
            )));
        }
        if self.container.trim().is_empty() {
            return Err(CmsError::Config("remote container name is required".to_string()));
        }

        Ok(root.canonicalize()?)
    }
}

/// Settings for the page server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub container: String,
    pub images_dir: String,
    pub layouts_dir: String,
    /// Top-level folders hidden from the page list
    pub exclude_folders: Vec<String>,
    /// Layout file extension, without the dot
    pub layout_extension: String,
    pub default_home: String,
    pub default_error: String,
    pub default_image: String,
    pub bind: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            container: "cms".to_string(),
            images_dir: "images".to_string(),
            layouts_dir: "layouts".to_string(),
            exclude_folders: vec!["images".to_string(), "layouts".to_string()],
            layout_extension: "html".to_string(),
            default_home: "MicroCMS".to_string(),
            default_error: "error".to_string(),
            default_image: "PROS.jpeg".to_string(),
            bind: "0.0.0.0:7071".to_string(),
        }
    }
}

/// Connection settings for the S3-compatible store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Custom endpoint for R2, MinIO and friends
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

/// Expand `~` in user-supplied paths
pub fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => PathBuf::from(shellexpand::tilde(text).to_string()),
        None => path.to_path_buf(),
    }
}
