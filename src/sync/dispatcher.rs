//! Event dispatch: raw notifications in, one engine task per action out

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use super::{RenamePairer, SyncAction, SyncEngine, RENAME_PAIR_WINDOW};

/// What the filesystem source delivers
pub type SourceMessage = notify::Result<notify::Event>;

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// Stop was requested
    Stopped,
    /// The event source went away on its own
    SourceClosed,
}

/// Feeds notifications through the rename pairer and runs each resulting
/// action on its own task
pub struct Dispatcher {
    engine: SyncEngine,
    pairer: RenamePairer,
    tasks: JoinSet<()>,
    grace: Duration,
}

impl Dispatcher {
    pub fn new(engine: SyncEngine, grace: Duration) -> Self {
        Self {
            engine,
            pairer: RenamePairer::new(),
            tasks: JoinSet::new(),
            grace,
        }
    }

    /// Dispatch until `stop` flips to true or the source closes, then give
    /// in-flight actions up to the grace period to finish
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SourceMessage>,
        mut stop: watch::Receiver<bool>,
    ) -> DispatchExit {
        let mut ticker = tokio::time::interval(RENAME_PAIR_WINDOW / 2);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = if *stop.borrow() {
            DispatchExit::Stopped
        } else {
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break DispatchExit::Stopped;
                        }
                    }
                    message = events.recv() => match message {
                        Some(Ok(event)) => {
                            for action in self.pairer.push(event, Instant::now()) {
                                self.spawn(action);
                            }
                        }
                        Some(Err(error)) => {
                            tracing::error!(error = %error, "Watch error");
                        }
                        None => break DispatchExit::SourceClosed,
                    },
                    _ = ticker.tick() => {
                        for action in self.pairer.flush_expired(Instant::now()) {
                            self.spawn(action);
                        }
                    }
                    Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                        log_join(joined);
                    }
                }
            }
        };

        for action in self.pairer.flush_all() {
            self.spawn(action);
        }
        self.drain().await;
        exit
    }

    fn spawn(&mut self, action: SyncAction) {
        let engine = self.engine.clone();
        self.tasks.spawn(async move { engine.apply(action).await });
    }

    async fn drain(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let grace = self.grace;
        tracing::info!(in_flight = self.tasks.len(), "Waiting for in-flight syncs");

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace period elapsed, aborting remaining syncs"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        if error.is_panic() {
            tracing::error!(error = %error, "Sync task panicked");
        } else {
            tracing::debug!(error = %error, "Sync task cancelled");
        }
    }
}
