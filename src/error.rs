//! Error types for MicroCMS

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for MicroCMS operations
pub type Result<T> = std::result::Result<T, CmsError>;

/// Main error type for MicroCMS
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path {} is not under watched root {}", path.display(), root.display())]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CmsError {
    /// Local races (file locked or already gone) that a later event usually fixes
    pub fn is_transient(&self) -> bool {
        match self {
            CmsError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// HTTP status used when the error reaches the page server
    pub fn status_code(&self) -> StatusCode {
        match self {
            CmsError::NotFound(_) | CmsError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
            CmsError::Config(_) | CmsError::ConfigParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CmsError::ContentStore(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CmsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "resultCode": "failure",
            "error": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
