//! Translation of raw `notify` events into sync actions
//!
//! Platforms report renames differently: inotify sends `From`, `To` and then
//! `Both` sharing one tracker cookie, Windows sends `From`/`To`, FSEvents only
//! says "something about this name changed". [`RenamePairer`] folds all of
//! these into at most one [`SyncAction::Rename`] per move.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};

use super::{ChangeEvent, ChangeKind, SyncAction};

/// How long a `From` half waits for its `To` before it counts as a delete
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(500);

/// Map a non-rename notify event kind to the change it represents
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Changed),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

#[derive(Debug)]
struct PendingFrom {
    path: PathBuf,
    tracker: Option<usize>,
    since: Instant,
}

/// Pairs the two halves of a rename, remembering just enough to drop duplicates
#[derive(Debug, Default)]
pub struct RenamePairer {
    pending: Option<PendingFrom>,
    last_paired: Option<(PathBuf, PathBuf)>,
}

impl RenamePairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `From` half is waiting for its partner
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one notify event, returning the actions it completes
    pub fn push(&mut self, event: Event, now: Instant) -> Vec<SyncAction> {
        let mut actions = self.flush_expired(now);
        let tracker = event.attrs.tracker();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.push_rename(mode, event.paths, tracker, now, &mut actions);
            }
            kind => {
                if let Some(change) = classify(&kind) {
                    actions.extend(
                        event
                            .paths
                            .into_iter()
                            .map(|path| SyncAction::Change(ChangeEvent::new(path, change))),
                    );
                }
            }
        }

        actions
    }

    /// Turn a `From` half that waited too long into a delete
    pub fn flush_expired(&mut self, now: Instant) -> Vec<SyncAction> {
        match &self.pending {
            Some(pending) if now.duration_since(pending.since) >= RENAME_PAIR_WINDOW => {
                self.flush_all()
            }
            _ => Vec::new(),
        }
    }

    /// Give up on any unpaired `From` half
    pub fn flush_all(&mut self) -> Vec<SyncAction> {
        self.pending
            .take()
            .map(|pending| {
                tracing::debug!(path = %pending.path.display(), "Rename source moved out of watch");
                SyncAction::Change(ChangeEvent::deleted(pending.path))
            })
            .into_iter()
            .collect()
    }

    fn push_rename(
        &mut self,
        mode: RenameMode,
        paths: Vec<PathBuf>,
        tracker: Option<usize>,
        now: Instant,
        actions: &mut Vec<SyncAction>,
    ) {
        match mode {
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                    return;
                };

                let already_paired = self
                    .last_paired
                    .as_ref()
                    .is_some_and(|(f, t)| *f == from && *t == to);
                if already_paired {
                    self.last_paired = None;
                    return;
                }

                if self.pending.as_ref().is_some_and(|p| p.path == from) {
                    self.pending = None;
                }
                actions.push(SyncAction::rename(from, to));
            }
            RenameMode::From => {
                actions.extend(self.flush_all());
                if let Some(path) = paths.into_iter().next() {
                    self.pending = Some(PendingFrom {
                        path,
                        tracker,
                        since: now,
                    });
                }
            }
            RenameMode::To => {
                let Some(to) = paths.into_iter().next() else {
                    return;
                };

                let matches = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| trackers_match(p.tracker, tracker));
                match self.pending.take() {
                    Some(pending) if matches => {
                        self.last_paired = Some((pending.path.clone(), to.clone()));
                        actions.push(SyncAction::rename(pending.path, to));
                    }
                    other => {
                        // Moved in from outside the watch
                        self.pending = other;
                        actions.push(SyncAction::Change(ChangeEvent::new(
                            to,
                            ChangeKind::RenamedTo,
                        )));
                    }
                }
            }
            RenameMode::Any | RenameMode::Other => {
                actions.extend(paths.into_iter().map(|path| {
                    let kind = if path_exists(&path) {
                        ChangeKind::RenamedTo
                    } else {
                        ChangeKind::RenamedFrom
                    };
                    SyncAction::Change(ChangeEvent::new(path, kind))
                }));
            }
        }
    }
}

fn trackers_match(pending: Option<usize>, incoming: Option<usize>) -> bool {
    match (pending, incoming) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
