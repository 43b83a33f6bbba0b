use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::watch;
use tokio::time::Instant;
use walkdir::WalkDir;

use super::WatcherError;

/// How long a path must stay quiet before its raw OS events are folded
/// into a single change.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(50);

/// A filesystem change, with a path relative to the watched root using `/`
/// separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    Add(String),
    Change(String),
    Unlink(String),
}

impl FsChange {
    pub fn path(&self) -> &str {
        match self {
            FsChange::Add(p) | FsChange::Change(p) | FsChange::Unlink(p) => p,
        }
    }
}

/// Where the watcher gets its view of the tree from.
///
/// `start` returns the files present right now and a channel of everything
/// that happens afterwards. `stop` releases whatever the source holds and
/// must be safe to call more than once.
pub trait FsSource: Send + 'static {
    fn start(
        &mut self,
        root: &Path,
    ) -> Result<(Vec<String>, flume::Receiver<FsChange>), WatcherError>;

    fn stop(&mut self);
}

/// Render `path` relative to `root` with `/` separators.
/// Returns `None` for the root itself and for paths outside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn list_files(root: &Path, dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| relative_path(root, entry.path()))
        .collect()
}

/// [`FsSource`] backed by the platform's native file notifications.
pub struct NotifySource {
    quiet: Duration,
    watcher: Option<RecommendedWatcher>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Default for NotifySource {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_WINDOW)
    }
}

impl NotifySource {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            watcher: None,
            shutdown: None,
        }
    }
}

impl FsSource for NotifySource {
    fn start(
        &mut self,
        root: &Path,
    ) -> Result<(Vec<String>, flume::Receiver<FsChange>), WatcherError> {
        // notify reports canonical paths on some platforms
        let root = std::fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(WatcherError::NotADirectory(root));
        }

        let (raw_tx, raw_rx) = flume::unbounded::<PathBuf>();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for path in event.paths {
                        let _ = raw_tx.send(path);
                    }
                }
                Err(e) => tracing::warn!("filesystem notification error: {}", e),
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        // Enumerate after the watch is armed so nothing slips between the two
        let files = list_files(&root, &root);
        let known: HashSet<String> = files.iter().cloned().collect();

        let (tx, rx) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(coalesce(root, known, raw_rx, tx, shutdown_rx, self.quiet));

        self.watcher = Some(watcher);
        self.shutdown = Some(shutdown_tx);
        Ok((files, rx))
    }

    fn stop(&mut self) {
        // Dropping the watcher releases the OS handle
        self.watcher.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

impl Drop for NotifySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Paths waiting to go quiet, each with its own deadline.
#[derive(Debug)]
struct QuietPaths {
    quiet: Duration,
    deadlines: HashMap<PathBuf, Instant>,
}

impl QuietPaths {
    fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadlines: HashMap::new(),
        }
    }

    /// Push the deadline for `path` out to `quiet` after `now`.
    fn touch(&mut self, path: PathBuf, now: Instant) {
        self.deadlines.insert(path, now + self.quiet);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return, sorted, every path whose deadline has passed.
    fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.deadlines.remove(path);
        }
        due.sort();
        due
    }
}

/// Fold raw notifications into add/change/unlink by looking at what is on
/// disk once a path has been quiet for `quiet`.
async fn coalesce(
    root: PathBuf,
    mut known: HashSet<String>,
    raw: flume::Receiver<PathBuf>,
    tx: flume::Sender<FsChange>,
    mut shutdown: watch::Receiver<bool>,
    quiet: Duration,
) {
    let mut pending = QuietPaths::new(quiet);
    loop {
        let deadline = pending.next_deadline();
        tokio::select! {
            _ = shutdown.changed() => break,
            recv = raw.recv_async() => match recv {
                Ok(path) => pending.touch(path, Instant::now()),
                Err(_) => break,
            },
            _ = sleep_until_some(deadline), if deadline.is_some() => {
                for path in pending.take_due(Instant::now()) {
                    for change in classify(&root, &mut known, &path) {
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("notify source for {} stopped", root.display());
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn classify(root: &Path, known: &mut HashSet<String>, path: &Path) -> Vec<FsChange> {
    let Some(rel) = relative_path(root, path) else {
        return Vec::new();
    };

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {
            if known.insert(rel.clone()) {
                vec![FsChange::Add(rel)]
            } else {
                vec![FsChange::Change(rel)]
            }
        }
        // A directory appearing (mkdir, or a tree moved in) brings its files
        Ok(meta) if meta.is_dir() => list_files(root, path)
            .into_iter()
            .filter(|file| known.insert(file.clone()))
            .map(FsChange::Add)
            .collect(),
        Ok(_) => Vec::new(),
        Err(_) => {
            if known.remove(&rel) {
                return vec![FsChange::Unlink(rel)];
            }
            // A directory vanished: everything under it is gone too
            let prefix = format!("{}/", rel);
            let mut gone: Vec<String> = known
                .iter()
                .filter(|p| p.starts_with(&prefix))
                .cloned()
                .collect();
            gone.sort();
            for p in &gone {
                known.remove(p);
            }
            gone.into_iter().map(FsChange::Unlink).collect()
        }
    }
}
