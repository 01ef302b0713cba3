//! Suppression of repeat events for a file that was just uploaded
//!
//! One save in an editor often raises several notifications (metadata touch,
//! truncate, content write). Only the most recent upload is remembered; a
//! different file is never suppressed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// The last file uploaded and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentWrite {
    pub path: PathBuf,
    pub at: DateTime<Utc>,
}

/// Single-slot debounce memory
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<RecentWrite>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last(&self) -> Option<&RecentWrite> {
        self.last.as_ref()
    }

    /// False only for the same path inside the quiet window
    pub fn should_process(&self, path: &Path, now: DateTime<Utc>) -> bool {
        let Some(last) = &self.last else {
            return true;
        };
        if last.path != path {
            return true;
        }

        // A clock that went backwards counts as inside the window
        match (now - last.at).to_std() {
            Ok(elapsed) => elapsed > self.window,
            Err(_) => false,
        }
    }

    /// Remember a successful upload, replacing whatever was there
    pub fn record(&mut self, path: &Path, now: DateTime<Utc>) {
        self.last = Some(RecentWrite {
            path: path.to_path_buf(),
            at: now,
        });
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_DEBOUNCE_MS))
    }
}
