//! Live content-addressed index of a directory tree.
//!
//! A [`Watcher`] hashes every file under a root into a [`Cid`], keeps the
//! path <-> cid mapping current as files come and go, and tells subscribers
//! what changed. The filesystem itself is abstracted behind [`FsSource`] so
//! tests can drive the watcher with synthetic changes.

mod index;
mod source;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::linked_data::{Cid, CidHasher};

pub use index::WatcherIndex;
pub use source::{relative_path, FsChange, FsSource, NotifySource, DEFAULT_QUIET_WINDOW};

/// Capacity of each subscriber's channel
pub const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("watcher already started")]
    AlreadyStarted,
    #[error("watcher stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Uninitialized,
    Scanning,
    Ready,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A committed change to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub cid: Cid,
    pub path: String,
}

struct Shared {
    root: PathBuf,
    index: RwLock<WatcherIndex>,
    state: RwLock<WatcherState>,
    observers: Mutex<Vec<flume::Sender<WatchEvent>>>,
}

pub struct Watcher {
    shared: Arc<Shared>,
    source: Mutex<Box<dyn FsSource>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    /// Watch `root` through native filesystem notifications
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_source(root, NotifySource::default())
    }

    pub fn with_source(root: impl Into<PathBuf>, source: impl FsSource) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                root: root.into(),
                index: RwLock::new(WatcherIndex::default()),
                state: RwLock::new(WatcherState::Uninitialized),
                observers: Mutex::new(Vec::new()),
            }),
            source: Mutex::new(Box::new(source)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Index the tree and begin following changes.
    ///
    /// Every file present at start is hashed concurrently; the watcher only
    /// becomes ready, and only starts reporting changes, once all of those
    /// have settled. The initial snapshot produces no notifications.
    pub async fn start(&self) -> Result<HashMap<Cid, String>, WatcherError> {
        {
            let mut state = self.shared.state.write();
            match *state {
                WatcherState::Uninitialized => *state = WatcherState::Scanning,
                WatcherState::Stopped => return Err(WatcherError::Stopped),
                _ => return Err(WatcherError::AlreadyStarted),
            }
        }

        let (files, changes) = match self.source.lock().start(&self.shared.root) {
            Ok(started) => started,
            Err(e) => {
                *self.shared.state.write() = WatcherState::Stopped;
                return Err(e);
            }
        };

        let root = self.shared.root.clone();
        let hashed = join_all(files.into_iter().map(|path| {
            let full = root.join(&path);
            async move { (hash_file(&full).await, path) }
        }))
        .await;

        {
            let mut index = self.shared.index.write();
            for (result, path) in hashed {
                match result {
                    Ok(cid) => index.insert(&path, cid),
                    Err(e) => tracing::warn!("failed to hash {}: {}", path, e),
                }
            }
            tracing::info!(
                "indexed {} files under {}",
                index.len(),
                self.shared.root.display()
            );
        }

        // stop() may have raced the scan
        {
            let mut state = self.shared.state.write();
            if *state == WatcherState::Stopped {
                return Err(WatcherError::Stopped);
            }
            *state = WatcherState::Ready;
        }

        let shared = self.shared.clone();
        let shutdown = self.shutdown.subscribe();
        *self.task.lock() = Some(tokio::spawn(process_changes(shared, changes, shutdown)));

        Ok(self.cid_map())
    }

    /// Receive every change committed after this call
    pub fn subscribe(&self) -> flume::Receiver<WatchEvent> {
        let (tx, rx) = flume::bounded(SUBSCRIBER_CAPACITY);
        self.shared.observers.lock().push(tx);
        rx
    }

    pub fn lookup(&self, cid: &Cid) -> Option<String> {
        self.shared.index.read().lookup(cid).map(str::to_string)
    }

    pub fn cid_for(&self, path: &str) -> Option<Cid> {
        self.shared.index.read().cid_for(path)
    }

    pub fn cid_map(&self) -> HashMap<Cid, String> {
        self.shared.index.read().cid_map()
    }

    pub fn entries(&self) -> Vec<(String, Cid)> {
        self.shared.index.read().entries()
    }

    pub fn state(&self) -> WatcherState {
        *self.shared.state.read()
    }

    /// Release the OS watch and end change processing. Safe to call twice.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.write();
            if *state == WatcherState::Stopped {
                return;
            }
            *state = WatcherState::Stopped;
        }
        let _ = self.shutdown.send(true);
        self.source.lock().stop();
        // Dropping the senders ends every subscriber's stream
        self.shared.observers.lock().clear();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        tracing::debug!("watcher for {} stopped", self.shared.root.display());
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn hash_file(path: &Path) -> std::io::Result<Cid> {
    let file = tokio::fs::File::open(path).await?;
    CidHasher::from_async_reader(file).await
}

async fn process_changes(
    shared: Arc<Shared>,
    changes: flume::Receiver<FsChange>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            change = changes.recv_async() => match change {
                Ok(change) => apply(&shared, change).await,
                Err(_) => break,
            },
        }
    }
}

async fn apply(shared: &Shared, change: FsChange) {
    let event = match change {
        FsChange::Add(path) | FsChange::Change(path) => {
            // The old mapping goes before we hash, so a failed hash leaves
            // the path unindexed rather than pointing at stale content
            let previous = shared.index.write().remove(&path);
            let kind = if previous.is_some() {
                ChangeKind::Change
            } else {
                ChangeKind::Add
            };
            let cid = match hash_file(&shared.root.join(&path)).await {
                Ok(cid) => cid,
                Err(e) => {
                    tracing::warn!("dropping {} of {}: {}", kind.as_str(), path, e);
                    return;
                }
            };
            shared.index.write().insert(&path, cid);
            WatchEvent { kind, cid, path }
        }
        FsChange::Unlink(path) => {
            let Some(cid) = shared.index.write().remove(&path) else {
                return;
            };
            WatchEvent {
                kind: ChangeKind::Delete,
                cid,
                path,
            }
        }
    };

    tracing::debug!("{} {} {}", event.kind.as_str(), event.path, event.cid);
    notify_observers(shared, event).await;
}

async fn notify_observers(shared: &Shared, event: WatchEvent) {
    let observers: Vec<_> = shared.observers.lock().clone();
    let mut closed = false;
    for tx in &observers {
        if tx.send_async(event.clone()).await.is_err() {
            closed = true;
        }
    }
    if closed {
        shared.observers.lock().retain(|tx| !tx.is_disconnected());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Source driven by hand from the test
    struct ManualSource {
        files: Vec<String>,
        rx: Option<flume::Receiver<FsChange>>,
        stops: Arc<Mutex<usize>>,
    }

    impl FsSource for ManualSource {
        fn start(
            &mut self,
            _root: &Path,
        ) -> Result<(Vec<String>, flume::Receiver<FsChange>), WatcherError> {
            let rx = self.rx.take().ok_or(WatcherError::AlreadyStarted)?;
            Ok((self.files.clone(), rx))
        }

        fn stop(&mut self) {
            *self.stops.lock() += 1;
        }
    }

    fn manual(
        root: &Path,
        files: &[&str],
    ) -> (Watcher, flume::Sender<FsChange>, Arc<Mutex<usize>>) {
        let (tx, rx) = flume::unbounded();
        let stops = Arc::new(Mutex::new(0));
        let source = ManualSource {
            files: files.iter().map(|f| f.to_string()).collect(),
            rx: Some(rx),
            stops: stops.clone(),
        };
        (Watcher::with_source(root, source), tx, stops)
    }

    async fn next(rx: &flume::Receiver<WatchEvent>) -> WatchEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
            .await
            .expect("timed out waiting for watch event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_scan_indexes_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.txt"), b"beta").unwrap();

        let (watcher, _tx, _) = manual(dir.path(), &["a.txt", "nested/b.txt"]);
        assert_eq!(watcher.state(), WatcherState::Uninitialized);

        let map = watcher.start().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Ready);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&Cid::from_raw(b"alpha")], "a.txt");
        assert_eq!(
            watcher.cid_for("nested/b.txt"),
            Some(Cid::from_raw(b"beta"))
        );
        assert_eq!(
            watcher.lookup(&Cid::from_raw(b"beta")).as_deref(),
            Some("nested/b.txt")
        );
    }

    #[tokio::test]
    async fn test_change_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, tx, _) = manual(dir.path(), &[]);
        watcher.start().await.unwrap();
        let events = watcher.subscribe();

        std::fs::write(dir.path().join("new.txt"), b"one").unwrap();
        tx.send(FsChange::Add("new.txt".into())).unwrap();
        let ev = next(&events).await;
        assert_eq!(ev.kind, ChangeKind::Add);
        assert_eq!(ev.cid, Cid::from_raw(b"one"));

        std::fs::write(dir.path().join("new.txt"), b"two").unwrap();
        tx.send(FsChange::Change("new.txt".into())).unwrap();
        let ev = next(&events).await;
        assert_eq!(ev.kind, ChangeKind::Change);
        assert_eq!(ev.cid, Cid::from_raw(b"two"));
        assert_eq!(watcher.lookup(&Cid::from_raw(b"one")), None);

        std::fs::remove_file(dir.path().join("new.txt")).unwrap();
        tx.send(FsChange::Unlink("new.txt".into())).unwrap();
        let ev = next(&events).await;
        assert_eq!(ev.kind, ChangeKind::Delete);
        assert_eq!(ev.cid, Cid::from_raw(b"two"));
        assert!(watcher.cid_map().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_unlink_and_hash_failure_are_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, tx, _) = manual(dir.path(), &[]);
        watcher.start().await.unwrap();
        let events = watcher.subscribe();

        tx.send(FsChange::Unlink("ghost".into())).unwrap();
        tx.send(FsChange::Add("missing-on-disk".into())).unwrap();
        std::fs::write(dir.path().join("real"), b"real").unwrap();
        tx.send(FsChange::Add("real".into())).unwrap();

        // Only the real file gets through
        let ev = next(&events).await;
        assert_eq!(ev.path, "real");
        assert_eq!(watcher.state(), WatcherState::Ready);
        assert_eq!(watcher.cid_for("missing-on-disk"), None);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _tx, stops) = manual(dir.path(), &[]);
        watcher.start().await.unwrap();
        let events = watcher.subscribe();

        watcher.stop();
        watcher.stop();
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert_eq!(*stops.lock(), 1);
        assert!(events.recv_async().await.is_err());
        assert!(matches!(
            watcher.start().await,
            Err(WatcherError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _tx, _) = manual(dir.path(), &[]);
        watcher.start().await.unwrap();
        assert!(matches!(
            watcher.start().await,
            Err(WatcherError::AlreadyStarted)
        ));
    }
}
