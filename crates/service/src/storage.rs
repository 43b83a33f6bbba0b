//! Uploaded files on disk, one file per CID under the store directory.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use common::prelude::{Cid, CidHasher, Codec};

use crate::sniff::SNIFF_LEN;

const TMP_DIR: &str = "tmp";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to prepare store directory {path}: {source}")]
    Setup { path: PathBuf, source: io::Error },
    #[error("failed to stage upload: {0}")]
    Stage(io::Error),
    #[error("failed to move upload into the store: {0}")]
    Commit(io::Error),
    #[error("failed to remove {cid}: {source}")]
    Remove { cid: Cid, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl ContentStore {
    /// Use `root` as the store, creating it and its temp directory
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let tmp = root.join(TMP_DIR);
        fs::create_dir_all(&tmp)
            .await
            .map_err(|e| StorageError::Setup {
                path: tmp.clone(),
                source: e,
            })?;
        Ok(Self { root, tmp })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, cid: &Cid) -> PathBuf {
        self.root.join(cid.to_string())
    }

    /// Start a new upload in the temp directory
    pub async fn stage(&self) -> Result<StagedUpload, StorageError> {
        let path = self.tmp.join(uuid::Uuid::new_v4().to_string());
        let file = File::create(&path).await.map_err(StorageError::Stage)?;
        Ok(StagedUpload {
            path,
            file: Some(file),
            cid: CidHasher::new(),
            sha256: Sha256::new(),
            head: Vec::with_capacity(SNIFF_LEN),
            size: 0,
        })
    }

    /// Move a finished upload to `{root}/{cid}`. Identical content
    /// overwrites an identical file.
    pub async fn commit(&self, mut staged: StagedUpload) -> Result<StoredContent, StorageError> {
        if let Some(mut file) = staged.file.take() {
            file.flush().await.map_err(StorageError::Commit)?;
            file.sync_all().await.map_err(StorageError::Commit)?;
        }
        let cid = staged.cid.finalize(Codec::Raw);
        let target = self.path_for(&cid);
        let created = !fs::try_exists(&target).await.map_err(StorageError::Commit)?;
        fs::rename(&staged.path, &target)
            .await
            .map_err(StorageError::Commit)?;
        tracing::debug!(%cid, size = staged.size, "committed upload");

        Ok(StoredContent {
            cid,
            sha256: hex::encode(staged.sha256.clone().finalize()),
            size: staged.size,
            head: std::mem::take(&mut staged.head),
            created,
        })
    }

    /// Delete the file for `cid`; a missing file is not an error
    pub async fn remove(&self, cid: &Cid) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(cid)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Remove {
                cid: *cid,
                source: e,
            }),
        }
    }
}

/// An upload in progress. Hashes as it writes; the temp file is removed
/// if the upload is dropped without being committed.
pub struct StagedUpload {
    path: PathBuf,
    file: Option<File>,
    cid: CidHasher,
    sha256: Sha256,
    head: Vec<u8>,
    size: u64,
}

impl StagedUpload {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Stage(io::Error::other("upload already finished")))?;
        file.write_all(chunk).await.map_err(StorageError::Stage)?;

        self.cid.update(chunk);
        self.sha256.update(chunk);
        if self.head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        // after a commit the path has been renamed away and this is a no-op
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A committed upload
#[derive(Debug, Clone)]
pub struct StoredContent {
    pub cid: Cid,
    /// hex SHA-256 of the file, the NIP-94 `ox` value
    pub sha256: String,
    pub size: u64,
    /// the first bytes of the file, for content sniffing
    pub head: Vec<u8>,
    /// false when identical content was already stored
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();

        let mut staged = store.stage().await.unwrap();
        staged.write(b"hello ").await.unwrap();
        staged.write(b"world").await.unwrap();
        assert_eq!(staged.size(), 11);
        let stored = store.commit(staged).await.unwrap();

        assert_eq!(stored.cid, Cid::from_raw(b"hello world"));
        assert_eq!(
            stored.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(stored.head, b"hello world");
        assert!(stored.created);
        assert_eq!(
            std::fs::read(store.path_for(&stored.cid)).unwrap(),
            b"hello world"
        );
        assert_eq!(std::fs::read_dir(dir.path().join(TMP_DIR)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_head_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let mut staged = store.stage().await.unwrap();
        let data = vec![7u8; SNIFF_LEN + 1000];
        for chunk in data.chunks(3000) {
            staged.write(chunk).await.unwrap();
        }
        let stored = store.commit(staged).await.unwrap();
        assert_eq!(stored.head.len(), SNIFF_LEN);
        assert_eq!(stored.size, data.len() as u64);
    }

    #[tokio::test]
    async fn test_abandoned_upload_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let mut staged = store.stage().await.unwrap();
        staged.write(b"partial").await.unwrap();
        drop(staged);
        assert_eq!(std::fs::read_dir(dir.path().join(TMP_DIR)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let mut staged = store.stage().await.unwrap();
        staged.write(b"bytes").await.unwrap();
        let stored = store.commit(staged).await.unwrap();

        assert!(store.path_for(&stored.cid).is_file());
        assert!(store.remove(&stored.cid).await.unwrap());
        assert!(!store.remove(&stored.cid).await.unwrap());
        assert!(!store.path_for(&stored.cid).exists());
    }

    #[tokio::test]
    async fn test_recommit_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        for expected in [true, false] {
            let mut staged = store.stage().await.unwrap();
            staged.write(b"twice").await.unwrap();
            assert_eq!(store.commit(staged).await.unwrap().created, expected);
        }
    }
}
