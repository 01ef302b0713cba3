//! The synchronization engine
//!
//! Every event walks Received → Filtered → Debounced → Resolved → Dispatched
//! → Recorded and ends Suppressed, Completed or Failed. Each stage returns a
//! plain `Result`; the outcome is logged once, in [`SyncEngine::report`].
//! A folder moved into the tree also logs one line per file it uploads.
//!
//! Folders have no key of their own. Deleting one sweeps every key under its
//! prefix; moving one in uploads each file beneath it.
//!
//! Locking, outermost first:
//! 1. a per-path slot, so two actions on the same file never interleave;
//! 2. the upload lock (which owns the debounce memory) or the delete lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    ChangeEvent, ChangeKind, Debouncer, PathResolver, RecentWrite, RenameOutcome,
    SuppressReason, SyncAction, SyncOp, SyncOutcome,
};
use crate::config::WatcherConfig;
use crate::error::{CmsError, Result};
use crate::store::{object_key, ContentStore};
use crate::types::RawFile;

/// Filename fragments that never sync (Finder metadata, log files, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    entries: Vec<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|entry| !entry.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| file_name.contains(entry.as_str()))
    }
}

/// Hands out one async mutex per local path, dropping slots nobody holds
#[derive(Default)]
struct PathLocks {
    slots: parking_lot::Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl PathLocks {
    async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| slot.strong_count() > 0);
            match slots.get(path).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(Mutex::new(()));
                    slots.insert(path.to_path_buf(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }
}

struct EngineInner {
    store: Arc<dyn ContentStore>,
    container: String,
    resolver: PathResolver,
    exclusions: ExclusionSet,
    path_locks: PathLocks,
    /// Upload critical section; the debounce memory lives inside it
    uploads: Mutex<Debouncer>,
    /// Delete critical section
    deletes: Mutex<()>,
}

/// Mirrors local file changes into one remote container
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        container: impl Into<String>,
        resolver: PathResolver,
        exclusions: ExclusionSet,
        debounce_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                container: container.into().trim().to_string(),
                resolver,
                exclusions,
                path_locks: PathLocks::default(),
                uploads: Mutex::new(Debouncer::new(debounce_window)),
                deletes: Mutex::new(()),
            }),
        }
    }

    /// Engine for an already validated watch root
    pub fn from_config(store: Arc<dyn ContentStore>, root: PathBuf, config: &WatcherConfig) -> Self {
        Self::new(
            store,
            config.container.clone(),
            PathResolver::new(root, config.pages_dir.clone()),
            ExclusionSet::new(config.exclusions.iter().cloned()),
            config.debounce_window(),
        )
    }

    pub fn container(&self) -> &str {
        &self.inner.container
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.inner.resolver
    }

    /// Snapshot of the debounce memory
    pub async fn recent_write(&self) -> Option<RecentWrite> {
        self.inner.uploads.lock().await.last().cloned()
    }

    /// Run one action to completion. Never fails; outcomes are logged.
    pub async fn apply(&self, action: SyncAction) {
        match action {
            SyncAction::Change(event) => {
                self.handle_change(&event).await;
            }
            SyncAction::Rename { from, to } => {
                self.handle_rename(&from, &to).await;
            }
        }
    }

    /// Changed, Created or Deleted
    pub async fn handle_change(&self, event: &ChangeEvent) -> SyncOutcome {
        let outcome = match event.kind {
            ChangeKind::Changed | ChangeKind::Created => self.upload(event, true).await,
            ChangeKind::Deleted | ChangeKind::RenamedFrom => self.delete(&event.path).await,
            ChangeKind::RenamedTo => self.upload(event, false).await,
        };
        self.report(&event.path, &outcome);
        outcome
    }

    /// Delete the old key, then upload the new file. A failed upload does
    /// not restore the deleted key.
    pub async fn handle_rename(&self, from: &ChangeEvent, to: &ChangeEvent) -> RenameOutcome {
        let removed = self.delete(&from.path).await;
        self.report(&from.path, &removed);

        let created = self.upload(to, false).await;
        self.report(&to.path, &created);

        RenameOutcome { removed, created }
    }

    fn filter(&self, path: &Path) -> std::result::Result<(), SuppressReason> {
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(SuppressReason::EmptyPath);
        }
        let Some(file_name) = path.file_name() else {
            return Err(SuppressReason::EmptyPath);
        };
        if self.inner.exclusions.is_excluded(&file_name.to_string_lossy()) {
            return Err(SuppressReason::Excluded);
        }
        Ok(())
    }

    async fn upload(&self, event: &ChangeEvent, debounce: bool) -> SyncOutcome {
        let path = event.path.as_path();
        if let Err(reason) = self.filter(path) {
            return SyncOutcome::Suppressed(reason);
        }
        if tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            // A created folder's files raise their own events; a moved one's do not
            if debounce {
                return SyncOutcome::Suppressed(SuppressReason::Directory);
            }
            return self.upload_folder(path).await;
        }

        self.upload_one(path, event.observed_at, debounce).await
    }

    async fn upload_one(
        &self,
        path: &Path,
        observed_at: DateTime<Utc>,
        debounce: bool,
    ) -> SyncOutcome {
        let _path_guard = self.inner.path_locks.acquire(path).await;
        let mut recent = self.inner.uploads.lock().await;

        if debounce && !recent.should_process(path, observed_at) {
            return SyncOutcome::Suppressed(SuppressReason::Debounced);
        }

        let started = Utc::now();
        match self.upload_file(path).await {
            Ok((key, etag)) => {
                recent.record(path, started);
                SyncOutcome::Uploaded { key, etag }
            }
            Err(error) => SyncOutcome::Failed {
                op: SyncOp::Upload,
                path: path.to_path_buf(),
                error,
            },
        }
    }

    /// Upload every file under a folder that was moved into the tree
    async fn upload_folder(&self, folder: &Path) -> SyncOutcome {
        let listing = match self.inner.resolver.resolve(folder, true) {
            Ok(key) => collect_files(folder).await.map(|files| (key, files)),
            Err(error) => Err(error),
        };
        let (key, files) = match listing {
            Ok(listing) => listing,
            Err(error) => {
                return SyncOutcome::Failed {
                    op: SyncOp::Upload,
                    path: folder.to_path_buf(),
                    error,
                }
            }
        };

        let mut uploaded = 0;
        let mut failed = 0;
        for file in files {
            let outcome = match self.filter(&file) {
                Ok(()) => self.upload_one(&file, Utc::now(), false).await,
                Err(reason) => SyncOutcome::Suppressed(reason),
            };
            self.report(&file, &outcome);
            if outcome.is_completed() {
                uploaded += 1;
            } else if outcome.is_failed() {
                failed += 1;
            }
        }

        SyncOutcome::UploadedFolder {
            key,
            uploaded,
            failed,
        }
    }

    async fn upload_file(&self, path: &Path) -> Result<(String, String)> {
        let sub_path = self.inner.resolver.resolve(path, false)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let data = tokio::fs::read(path).await?;
        let file = RawFile::new(filename, data);

        let etag = self
            .inner
            .store
            .upload_file(&file, &self.inner.container, &sub_path)
            .await?;
        if etag.trim().is_empty() {
            return Err(CmsError::UploadRejected(format!(
                "store returned no entity tag for {}",
                file.filename
            )));
        }

        Ok((object_key(&sub_path, &file.filename), etag))
    }

    async fn delete(&self, path: &Path) -> SyncOutcome {
        if let Err(reason) = self.filter(path) {
            return SyncOutcome::Suppressed(reason);
        }

        let _path_guard = self.inner.path_locks.acquire(path).await;
        let _delete_guard = self.inner.deletes.lock().await;

        match self.delete_file(path).await {
            Ok((key, removed)) => SyncOutcome::Deleted { key, removed },
            Err(error) => SyncOutcome::Failed {
                op: SyncOp::Delete,
                path: path.to_path_buf(),
                error,
            },
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<(String, u64)> {
        let key = self.inner.resolver.resolve(path, true)?;
        let mut removed = self
            .inner
            .store
            .delete_file(&self.inner.container, &key)
            .await?;

        // No object under the exact key: the path may have been a folder.
        // An empty key is the container root and is never swept.
        if removed == 0 && !key.is_empty() {
            removed = self.delete_prefix(&key).await?;
        }
        Ok((key, removed))
    }

    /// Remove every key under `key/`. Caller holds the delete lock.
    async fn delete_prefix(&self, key: &str) -> Result<u64> {
        let prefix = format!("{}/", key);
        let children = self
            .inner
            .store
            .list_files(&self.inner.container, Some(&prefix))
            .await?;

        let mut removed = 0;
        // Listing trims the trailing separator, so `drafts2/` can come back for `drafts/`
        for child in children.iter().filter(|child| child.starts_with(&prefix)) {
            removed += self
                .inner
                .store
                .delete_file(&self.inner.container, child)
                .await?;
        }
        Ok(removed)
    }

    /// Single place an event's processing is logged
    fn report(&self, path: &Path, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Suppressed(reason) => {
                tracing::debug!(path = %path.display(), reason = ?reason, "Event suppressed");
            }
            SyncOutcome::Uploaded { key, etag } => {
                tracing::info!(
                    container = %self.inner.container,
                    key = %key,
                    etag = %etag,
                    "Uploaded file"
                );
            }
            SyncOutcome::UploadedFolder {
                key,
                uploaded,
                failed,
            } => {
                if *failed > 0 {
                    tracing::warn!(
                        container = %self.inner.container,
                        key = %key,
                        uploaded,
                        failed,
                        "Uploaded folder with failures"
                    );
                } else {
                    tracing::info!(
                        container = %self.inner.container,
                        key = %key,
                        uploaded,
                        "Uploaded folder"
                    );
                }
            }
            SyncOutcome::Deleted { key, removed } => {
                tracing::info!(
                    container = %self.inner.container,
                    key = %key,
                    removed,
                    "Deleted file"
                );
            }
            SyncOutcome::Failed { op, path, error } if error.is_transient() => {
                tracing::warn!(op = %op, path = %path.display(), error = %error, "Sync skipped");
            }
            SyncOutcome::Failed { op, path, error } => {
                tracing::error!(op = %op, path = %path.display(), error = %error, "Sync failed");
            }
        }
    }
}

/// Every regular file under `folder`, depth first, sorted for a stable order
async fn collect_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![folder.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
