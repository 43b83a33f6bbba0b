//! Shared helpers for the watcher and tile integration tests
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A small site: an index, a stylesheet in a subdirectory and a text file
pub fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", b"<!doctype html><h1>Augury</h1>");
    write(dir.path(), "css/site.css", b"h1 { color: rebeccapurple; }");
    write(dir.path(), "poem.txt", b"Wild nights! Wild nights!");
    dir
}

pub fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Receive until `pred` accepts a message, failing the test on timeout
pub async fn wait_for<T, F>(rx: &flume::Receiver<T>, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        let msg = tokio::time::timeout_at(deadline, rx.recv_async())
            .await
            .expect("timed out waiting for notification")
            .expect("channel closed");
        if pred(&msg) {
            return msg;
        }
    }
}
