//! Local folder to remote store synchronization
//!
//! Filesystem notifications flow one way:
//! event → filter → debounce → resolve remote key → store call → outcome logged.
//!
//! Uploads and deletes each run inside their own process-wide critical
//! section. A rename is applied as one unit: delete the old key, then upload
//! the new file.

mod debounce;
mod dispatcher;
mod engine;
mod events;
mod lifecycle;
mod resolver;

pub use debounce::{Debouncer, RecentWrite};
pub use dispatcher::{DispatchExit, Dispatcher, SourceMessage};
pub use engine::{ExclusionSet, SyncEngine};
pub use events::{classify, RenamePairer, RENAME_PAIR_WINDOW};
pub use lifecycle::{
    shutdown_signal, ExitStatus, RunningWatch, ShutdownReason, Subscription, WatchService,
};
pub use resolver::PathResolver;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::CmsError;

/// What happened to a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Changed,
    Created,
    Deleted,
    RenamedFrom,
    RenamedTo,
}

impl ChangeKind {
    /// Content writes go through the debouncer; deletes and renames never do
    pub fn is_debounced(&self) -> bool {
        matches!(self, ChangeKind::Changed | ChangeKind::Created)
    }
}

/// One filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Utc::now(),
        }
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Changed)
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Created)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Deleted)
    }

    pub fn observed(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// Unit of work handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Change(ChangeEvent),
    /// Processed sequentially: delete `from`, then upload `to`
    Rename { from: ChangeEvent, to: ChangeEvent },
}

impl SyncAction {
    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        SyncAction::Rename {
            from: ChangeEvent::new(from, ChangeKind::RenamedFrom),
            to: ChangeEvent::new(to, ChangeKind::RenamedTo),
        }
    }
}

/// Remote operation an event maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Upload,
    Delete,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::Upload => write!(f, "upload"),
            SyncOp::Delete => write!(f, "delete"),
        }
    }
}

/// Why an event never reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    EmptyPath,
    Excluded,
    Directory,
    Debounced,
}

/// Terminal state of one event
#[derive(Debug)]
pub enum SyncOutcome {
    Suppressed(SuppressReason),
    Uploaded { key: String, etag: String },
    /// A folder moved into place, uploaded file by file
    UploadedFolder {
        key: String,
        uploaded: usize,
        failed: usize,
    },
    /// `removed` counts the key itself or, for a folder, every key under it
    Deleted { key: String, removed: u64 },
    Failed {
        op: SyncOp,
        path: PathBuf,
        error: CmsError,
    },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Uploaded { .. }
                | SyncOutcome::UploadedFolder { failed: 0, .. }
                | SyncOutcome::Deleted { .. }
        )
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, SyncOutcome::Suppressed(_))
    }

    pub fn is_failed(&self) -> bool {
        match self {
            SyncOutcome::Failed { .. } => true,
            SyncOutcome::UploadedFolder { failed, .. } => *failed > 0,
            _ => false,
        }
    }
}

/// Both halves of a rename
#[derive(Debug)]
pub struct RenameOutcome {
    pub removed: SyncOutcome,
    pub created: SyncOutcome,
}
