use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::linked_data::{Cid, CidError};
use crate::watcher::{ChangeKind, WatchEvent, Watcher, WatcherError};

use super::manifest::{media_type_for, Manifest, Resource, Tile, TileMeta};

pub const INDEX_PATH: &str = "/index.html";
pub const ROOT_PATH: &str = "/";

/// Sent to subscribers after every applied change
#[derive(Debug, Clone)]
pub struct ManifestUpdate {
    pub kind: ChangeKind,
    pub path: String,
    pub manifest: Arc<Manifest>,
}

struct Shared {
    snapshot: RwLock<Arc<Manifest>>,
    observers: Mutex<Vec<flume::Sender<ManifestUpdate>>>,
}

impl Shared {
    /// Copy-on-write update of the snapshot
    fn update(&self, f: impl FnOnce(&mut Manifest)) -> Arc<Manifest> {
        let mut snapshot = self.snapshot.write();
        let mut next = Manifest::clone(&snapshot);
        f(&mut next);
        let next = Arc::new(next);
        *snapshot = next.clone();
        next
    }

    fn add_resource(&self, path: &str, cid: Cid) -> Arc<Manifest> {
        self.update(|m| insert_resource(m, path, cid))
    }

    fn remove_resource(&self, path: &str) -> Arc<Manifest> {
        let path = normalize(path);
        self.update(|m| {
            if path == INDEX_PATH {
                m.resources.remove(ROOT_PATH);
            }
            m.resources.remove(&path);
        })
    }

    async fn apply(&self, event: WatchEvent) {
        let manifest = match event.kind {
            ChangeKind::Add | ChangeKind::Change => self.add_resource(&event.path, event.cid),
            ChangeKind::Delete => self.remove_resource(&event.path),
        };
        let update = ManifestUpdate {
            kind: event.kind,
            path: normalize(&event.path),
            manifest,
        };

        let observers: Vec<_> = self.observers.lock().clone();
        let mut closed = false;
        for tx in &observers {
            if tx.send_async(update.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.observers.lock().retain(|tx| !tx.is_disconnected());
        }
    }
}

fn insert_resource(manifest: &mut Manifest, path: &str, cid: Cid) {
    let path = normalize(path);
    let resource = Resource {
        src: cid,
        media_type: media_type_for(&path),
    };
    if path == INDEX_PATH {
        manifest
            .resources
            .insert(ROOT_PATH.to_string(), resource.clone());
    }
    manifest.resources.insert(path, resource);
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Builds a [`Manifest`] for a directory, once or continuously.
pub struct ManifestBuilder {
    watcher: Arc<Watcher>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, meta: TileMeta) -> Self {
        Self::with_watcher(Watcher::new(root), meta)
    }

    pub fn with_watcher(watcher: Watcher, meta: TileMeta) -> Self {
        Self {
            watcher: Arc::new(watcher),
            shared: Arc::new(Shared {
                snapshot: RwLock::new(Arc::new(Manifest::new(&meta))),
                observers: Mutex::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn add_resource(&self, path: &str, cid: Cid) {
        self.shared.add_resource(path, cid);
    }

    pub fn remove_resource(&self, path: &str) {
        self.shared.remove_resource(path);
    }

    /// Scan once and return the result; nothing is watched afterwards
    pub async fn generate(&self) -> Result<Manifest, WatcherError> {
        self.watcher.start().await?;
        self.load_entries();
        self.watcher.stop();
        Ok(self.manifest())
    }

    /// Scan, then keep the manifest current until [`stop`](Self::stop)
    pub async fn watch(&self) -> Result<Manifest, WatcherError> {
        // Subscribed before start so no change after the scan is missed
        let events = self.watcher.subscribe();
        self.watcher.start().await?;
        self.load_entries();

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                shared.apply(event).await;
            }
        });
        *self.task.lock() = Some(task);
        Ok(self.manifest())
    }

    fn load_entries(&self) {
        let entries = self.watcher.entries();
        self.shared.update(|m| {
            for (path, cid) in entries {
                insert_resource(m, &path, cid);
            }
        });
    }

    /// A copy of the current snapshot
    pub fn manifest(&self) -> Manifest {
        Manifest::clone(&self.shared.snapshot.read())
    }

    pub fn tile(&self) -> Result<Tile, CidError> {
        self.manifest().tile()
    }

    pub fn subscribe(&self) -> flume::Receiver<ManifestUpdate> {
        let (tx, rx) = flume::bounded(crate::watcher::SUBSCRIBER_CAPACITY);
        self.shared.observers.lock().push(tx);
        rx
    }

    pub fn stop(&self) {
        self.watcher.stop();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.observers.lock().clear();
    }
}

impl Drop for ManifestBuilder {
    fn drop(&mut self) {
        self.stop();
    }
}
