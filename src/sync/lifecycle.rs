//! Watch lifecycle: subscribe, block until told to stop, tear down

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{DispatchExit, Dispatcher, SourceMessage, SyncEngine};
use crate::config::WatcherConfig;
use crate::error::Result;
use crate::store::ContentStore;

/// Why the blocking wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Orderly stop (SIGTERM, service manager, caller)
    Requested,
    /// User interrupt (Ctrl-C)
    Interrupted,
    /// Signal handlers could not be installed
    SignalFailed,
}

/// Process exit status of the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Normal,
    Cancelled,
    Faulted,
}

impl ExitStatus {
    /// 0 normal, negative for user cancellation, positive for faults
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Normal => 0,
            ExitStatus::Cancelled => -1,
            ExitStatus::Faulted => 1,
        }
    }
}

impl From<ShutdownReason> for ExitStatus {
    fn from(reason: ShutdownReason) -> Self {
        match reason {
            ShutdownReason::Requested => ExitStatus::Normal,
            ShutdownReason::Interrupted => ExitStatus::Cancelled,
            ShutdownReason::SignalFailed => ExitStatus::Faulted,
        }
    }
}

/// A live recursive watch. Unsubscribing (or dropping) ends it.
pub struct Subscription {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl Subscription {
    /// Watch `root` recursively, forwarding every notification to `sender`
    pub fn subscribe(root: &Path, sender: mpsc::UnboundedSender<SourceMessage>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |message: SourceMessage| {
            // Receiver gone means we are shutting down
            let _ = sender.send(message);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unsubscribe(mut self) {
        if let Err(error) = self.watcher.unwatch(&self.root) {
            tracing::warn!(root = %self.root.display(), error = %error, "Failed to unwatch");
        }
        tracing::debug!(root = %self.root.display(), "Watch subscription closed");
    }
}

/// Builds and starts the watcher from configuration
pub struct WatchService {
    config: WatcherConfig,
    store: Arc<dyn ContentStore>,
}

impl WatchService {
    pub fn new(config: WatcherConfig, store: Arc<dyn ContentStore>) -> Self {
        Self { config, store }
    }

    /// Validate the root, subscribe and start dispatching.
    ///
    /// Must be called inside a Tokio runtime. A missing root is a
    /// configuration error and nothing is started.
    pub fn start(self) -> Result<RunningWatch> {
        let root = self.config.validate()?;
        let engine = SyncEngine::from_config(self.store, root.clone(), &self.config);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let subscription = Subscription::subscribe(&root, event_tx)?;
        let dispatcher = Dispatcher::new(engine.clone(), self.config.shutdown_grace());
        let dispatcher = tokio::spawn(dispatcher.run(event_rx, stop_rx));

        tracing::info!(
            root = %root.display(),
            container = %engine.container(),
            "Watcher started"
        );

        Ok(RunningWatch {
            root,
            engine,
            subscription,
            stop: stop_tx,
            dispatcher,
        })
    }
}

/// Handle to a started watcher
pub struct RunningWatch {
    root: PathBuf,
    engine: SyncEngine,
    subscription: Subscription,
    stop: watch::Sender<bool>,
    dispatcher: JoinHandle<DispatchExit>,
}

impl RunningWatch {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Block until `shutdown` resolves or the dispatcher dies, then tear the
    /// watch down. In-flight syncs get the configured grace period.
    pub async fn wait<F>(self, shutdown: F) -> ExitStatus
    where
        F: Future<Output = ShutdownReason>,
    {
        let RunningWatch {
            root,
            subscription,
            stop,
            mut dispatcher,
            ..
        } = self;

        tracing::info!(root = %root.display(), "Watching. Press Ctrl-C to quit.");

        let (status, dispatcher_done) = tokio::select! {
            reason = shutdown => {
                match reason {
                    ShutdownReason::Interrupted => tracing::info!("Watcher interrupted"),
                    ShutdownReason::Requested => tracing::info!("Watcher stop requested"),
                    ShutdownReason::SignalFailed => {
                        tracing::error!("Could not listen for shutdown signals")
                    }
                }
                (ExitStatus::from(reason), false)
            }
            joined = &mut dispatcher => {
                match joined {
                    Ok(exit) => tracing::error!(exit = ?exit, "Dispatcher stopped unexpectedly"),
                    Err(error) => tracing::error!(error = %error, "Dispatcher task failed"),
                }
                (ExitStatus::Faulted, true)
            }
        };

        let _ = stop.send(true);
        subscription.unsubscribe();

        if !dispatcher_done {
            if let Err(error) = dispatcher.await {
                tracing::error!(error = %error, "Dispatcher task failed during shutdown");
            }
        }

        tracing::info!(code = status.code(), "Watcher stopped");
        status
    }
}

/// Resolve on Ctrl-C (interrupt) or, on unix, SIGTERM (requested stop)
pub async fn shutdown_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                return ShutdownReason::SignalFailed;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => ShutdownReason::Interrupted,
                Err(error) => {
                    tracing::error!(error = %error, "Failed to listen for Ctrl-C");
                    ShutdownReason::SignalFailed
                }
            },
            _ = terminate.recv() => ShutdownReason::Requested,
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupted,
            Err(error) => {
                tracing::error!(error = %error, "Failed to listen for Ctrl-C");
                ShutdownReason::SignalFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Normal.code(), 0);
        assert!(ExitStatus::Cancelled.code() < 0);
        assert!(ExitStatus::Faulted.code() > 0);
    }

    #[test]
    fn test_reason_to_status() {
        assert_eq!(ExitStatus::from(ShutdownReason::Requested), ExitStatus::Normal);
        assert_eq!(
            ExitStatus::from(ShutdownReason::Interrupted),
            ExitStatus::Cancelled
        );
        assert_eq!(
            ExitStatus::from(ShutdownReason::SignalFailed),
            ExitStatus::Faulted
        );
    }
}
