//! Core types for MicroCMS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mime;

/// Raw file bytes plus the metadata needed to store or serve them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    /// Original filename including the extension
    pub filename: String,
    /// MIME type of the data
    pub content_type: String,
    /// File contents
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl RawFile {
    /// Wrap bytes, inferring the content type from the filename's extension
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime::content_type_for(&filename).to_string();
        Self {
            filename,
            content_type,
            data,
        }
    }

    /// The empty wrapper stores return when a file is absent
    pub fn empty() -> Self {
        Self {
            filename: String::new(),
            content_type: mime::OCTET_STREAM.to_string(),
            data: Vec::new(),
        }
    }

    /// A file needs a name and at least one byte to be stored or served
    pub fn is_valid(&self) -> bool {
        !self.filename.trim().is_empty() && !self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for RawFile {
    fn default() -> Self {
        Self::empty()
    }
}

/// Text content of a stored page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDetails {
    pub content: String,
    #[serde(rename = "name")]
    pub file_name: String,
    /// None when the container or file does not exist
    pub last_updated: Option<DateTime<Utc>>,
}

impl PageDetails {
    pub fn new(
        file_name: impl Into<String>,
        content: impl Into<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            file_name: file_name.into(),
            last_updated: Some(last_updated),
        }
    }

    /// Placeholder for a missing container or file
    pub fn missing(file_name: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            file_name: file_name.into(),
            last_updated: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.last_updated.is_none()
    }

    /// True when there is nothing worth rendering
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_file_validity() {
        assert!(!RawFile::empty().is_valid());
        assert!(!RawFile::new("  ", b"data".to_vec()).is_valid());
        assert!(!RawFile::new("a.md", Vec::new()).is_valid());

        let file = RawFile::new("a.md", b"# Hello".to_vec());
        assert!(file.is_valid());
        assert_eq!(file.content_type, "text/markdown");
        assert_eq!(file.len(), 7);
    }

    #[test]
    fn test_page_details_missing() {
        let page = PageDetails::missing("a.md");
        assert!(page.is_missing());
        assert!(page.is_blank());

        let page = PageDetails::new("a.md", "# Title", Utc::now());
        assert!(!page.is_missing());
        assert!(!page.is_blank());
    }
}
