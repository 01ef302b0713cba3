//! Local path to remote key mapping

use std::path::{Component, Path, PathBuf};

use crate::error::{CmsError, Result};
use crate::store::trim_key;

/// Maps files under the watched root to keys in the remote container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
    pages_dir: String,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, pages_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pages_dir: trim_key(&pages_dir.into()).to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remote key for `full_path`.
    ///
    /// With `include_file_name` false only the containing folder is returned,
    /// which is what uploads take alongside the filename. The local pages
    /// folder is not mirrored remotely, so a leading `pages_dir` segment is
    /// dropped. An empty result means the container root.
    pub fn resolve(&self, full_path: &Path, include_file_name: bool) -> Result<String> {
        let relative =
            full_path
                .strip_prefix(&self.root)
                .map_err(|_| CmsError::PathOutsideRoot {
                    path: full_path.to_path_buf(),
                    root: self.root.clone(),
                })?;

        let mut segments: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if !include_file_name {
            segments.pop();
        }

        let joined = segments.join("/");
        let key = trim_key(&joined);
        Ok(self.strip_pages_prefix(key).to_string())
    }

    fn strip_pages_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.pages_dir.is_empty() {
            return key;
        }
        match key.strip_prefix(self.pages_dir.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => trim_key(rest),
            _ => key,
        }
    }
}
