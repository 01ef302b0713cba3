//! File extension to MIME type mapping

use std::path::Path;

/// Fallback when a file has an extension we don't know
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Content type of the empty file wrapper
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Look up the MIME type for an extension, with or without the leading dot
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    let mime = match ext.as_str() {
        "bmp" => "image/bmp",
        "css" => "text/css",
        "csv" => "text/csv",
        "gif" => "image/gif",
        "htm" | "html" => "text/html",
        "ico" => "image/x-icon",
        "jpg" | "jpeg" => "image/jpeg",
        "js" => "text/javascript",
        "json" => "application/json",
        "md" | "markdown" => "text/markdown",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        "webp" => "image/webp",
        "xml" => "application/xml",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}

/// MIME type for a file name or path, falling back to [`DEFAULT_MIME_TYPE`]
pub fn content_type_for(file_name: &str) -> &'static str {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(mime_for_extension(".png"), Some("image/png"));
        assert_eq!(mime_for_extension("PNG"), Some("image/png"));
        assert_eq!(mime_for_extension("jpeg"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("exe"), None);
    }

    #[test]
    fn test_content_type_for_paths() {
        assert_eq!(content_type_for("sub/a.md"), "text/markdown");
        assert_eq!(content_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(content_type_for("Makefile"), DEFAULT_MIME_TYPE);
        assert_eq!(content_type_for("archive.rar"), DEFAULT_MIME_TYPE);
    }
}
