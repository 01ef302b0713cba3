//! Dispatcher and watch lifecycle tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, oneshot, watch};

use microcms::config::WatcherConfig;
use microcms::error::CmsError;
use microcms::store::{MemoryStore, StoreOperation};
use microcms::sync::{
    DispatchExit, Dispatcher, ExclusionSet, ExitStatus, PathResolver, ShutdownReason,
    SyncEngine, WatchService,
};

const CONTAINER: &str = "cms";

async fn wait_until(check: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn site() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("page")).unwrap();
    (dir, root)
}

fn engine(store: &Arc<MemoryStore>, root: &PathBuf) -> SyncEngine {
    SyncEngine::new(
        store.clone(),
        CONTAINER,
        PathResolver::new(root.clone(), "page"),
        ExclusionSet::new(["DS_Store"]),
        Duration::from_secs(2),
    )
}

fn rename_event(mode: RenameMode, paths: &[&PathBuf], tracker: usize) -> Event {
    paths
        .iter()
        .fold(
            Event::new(EventKind::Modify(ModifyKind::Name(mode))),
            |event, path| event.add_path((*path).clone()),
        )
        .set_tracker(tracker)
}

fn watcher_config(root: &PathBuf) -> WatcherConfig {
    WatcherConfig {
        local_root: Some(root.clone()),
        debounce_ms: 200,
        shutdown_grace_ms: 2000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dispatcher_uploads_created_file_and_stops() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));
    let path = root.join("page/post.md");
    std::fs::write(&path, "# Post").unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));
    let handle = tokio::spawn(dispatcher.run(rx, stop_rx));

    tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(path)))
        .unwrap();

    let probe = store.clone();
    assert!(wait_until(move || probe.contains(CONTAINER, "post.md"), Duration::from_secs(5)).await);

    stop_tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), DispatchExit::Stopped);
}

#[tokio::test]
async fn test_dispatcher_drains_in_flight_work_when_source_closes() {
    let (_dir, root) = site();
    let store = Arc::new(
        MemoryStore::with_container(CONTAINER).with_latency(Duration::from_millis(100)),
    );
    let a = root.join("page/a.md");
    let b = root.join("page/b.md");
    std::fs::write(&a, "a").unwrap();
    std::fs::write(&b, "b").unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));

    tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(a)))
        .unwrap();
    tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(b)))
        .unwrap();
    drop(tx);

    assert_eq!(dispatcher.run(rx, stop_rx).await, DispatchExit::SourceClosed);
    assert!(store.contains(CONTAINER, "a.md"));
    assert!(store.contains(CONTAINER, "b.md"));
}

#[tokio::test]
async fn test_dispatcher_pairs_inotify_rename_sequence() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));
    store.insert(CONTAINER, "old.md", "body");
    let old = root.join("page/old.md");
    let new = root.join("page/new.md");
    std::fs::write(&new, "body").unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));

    tx.send(Ok(rename_event(RenameMode::From, &[&old], 7))).unwrap();
    tx.send(Ok(rename_event(RenameMode::To, &[&new], 7))).unwrap();
    tx.send(Ok(rename_event(RenameMode::Both, &[&old, &new], 7)))
        .unwrap();
    drop(tx);

    dispatcher.run(rx, stop_rx).await;

    assert_eq!(
        store.operations(),
        vec![
            StoreOperation::Delete {
                container: CONTAINER.to_string(),
                key: "old.md".to_string(),
            },
            StoreOperation::Upload {
                container: CONTAINER.to_string(),
                key: "new.md".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_unpaired_rename_source_becomes_delete() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));
    store.insert(CONTAINER, "moved-away.md", "body");
    let moved = root.join("page/moved-away.md");

    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));
    let handle = tokio::spawn(dispatcher.run(rx, stop_rx));

    tx.send(Ok(rename_event(RenameMode::From, &[&moved], 9))).unwrap();

    // Expires through the pairing window, not through shutdown
    let probe = store.clone();
    assert!(
        wait_until(
            move || !probe.contains(CONTAINER, "moved-away.md"),
            Duration::from_secs(5)
        )
        .await
    );

    stop_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(store.delete_count(), 1);
}

#[tokio::test]
async fn test_dispatcher_survives_watch_errors() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));
    store.insert(CONTAINER, "post.md", "x");
    let path = root.join("page/post.md");

    let (tx, rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));

    tx.send(Err(notify::Error::generic("queue overflow"))).unwrap();
    tx.send(Ok(Event::new(EventKind::Remove(RemoveKind::File)).add_path(path)))
        .unwrap();
    drop(tx);

    dispatcher.run(rx, stop_rx).await;
    assert!(!store.contains(CONTAINER, "post.md"));
}

#[tokio::test]
async fn test_stop_before_start_dispatches_nothing() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));

    let (_tx, rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(true);
    let dispatcher = Dispatcher::new(engine(&store, &root), Duration::from_secs(5));

    assert_eq!(dispatcher.run(rx, stop_rx).await, DispatchExit::Stopped);
    assert!(store.operations().is_empty());
}

#[tokio::test]
async fn test_missing_root_is_a_config_error() {
    let store = Arc::new(MemoryStore::with_container(CONTAINER));
    let config = WatcherConfig {
        local_root: Some(PathBuf::from("/definitely/not/a/site")),
        ..Default::default()
    };

    let result = WatchService::new(config, store.clone()).start();
    assert!(matches!(result, Err(CmsError::Config(_))));
    assert!(store.operations().is_empty());
}

#[tokio::test]
async fn test_requested_stop_exits_normally() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));

    let running = WatchService::new(watcher_config(&root), store)
        .start()
        .unwrap();
    assert_eq!(running.root(), root.as_path());

    let status = running.wait(async { ShutdownReason::Requested }).await;
    assert_eq!(status, ExitStatus::Normal);
    assert_eq!(status.code(), 0);
}

#[tokio::test]
async fn test_interrupt_exits_cancelled() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));

    let running = WatchService::new(watcher_config(&root), store)
        .start()
        .unwrap();
    let status = running.wait(async { ShutdownReason::Interrupted }).await;

    assert_eq!(status, ExitStatus::Cancelled);
    assert!(status.code() < 0);
}

#[tokio::test]
async fn test_signal_failure_exits_faulted() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));

    let running = WatchService::new(watcher_config(&root), store)
        .start()
        .unwrap();
    let status = running.wait(async { ShutdownReason::SignalFailed }).await;

    assert_eq!(status, ExitStatus::Faulted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_watch_mirrors_writes_and_deletes() {
    let (_dir, root) = site();
    let store = Arc::new(MemoryStore::with_container(CONTAINER));

    let running = WatchService::new(watcher_config(&root), store.clone())
        .start()
        .unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let waiter = tokio::spawn(running.wait(async move {
        let _ = stop_rx.await;
        ShutdownReason::Requested
    }));

    let page = root.join("page/live.md");
    std::fs::write(&page, "# Live").unwrap();

    let probe = store.clone();
    assert!(
        wait_until(
            move || probe.get(CONTAINER, "live.md") == Some(b"# Live".to_vec()),
            Duration::from_secs(10)
        )
        .await
    );

    std::fs::remove_file(&page).unwrap();
    let probe = store.clone();
    assert!(
        wait_until(
            move || !probe.contains(CONTAINER, "live.md"),
            Duration::from_secs(10)
        )
        .await
    );

    stop_tx.send(()).unwrap();
    assert_eq!(waiter.await.unwrap(), ExitStatus::Normal);
}
