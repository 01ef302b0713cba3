//! MicroCMS - Markdown pages served from cloud storage
//!
//! A folder watcher mirrors a local site tree into an S3-compatible store,
//! and a small HTTP server renders the stored Markdown through HTML layouts.

pub mod cms;
pub mod config;
pub mod error;
pub mod logging;
pub mod mime;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{CmsError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
