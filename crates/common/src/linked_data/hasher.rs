use std::io::Read;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::cid::{Cid, Codec};

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 hasher that mints a [`Cid`] when finished.
///
/// Content is fed in arbitrary slices and never buffered, so files of any
/// size can be identified in constant memory.
#[derive(Default, Clone)]
pub struct CidHasher {
    inner: blake3::Hasher,
}

impl CidHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn finalize(&self, codec: Codec) -> Cid {
        Cid::new(codec, *self.inner.finalize().as_bytes())
    }

    /// Identify everything readable from `reader` as raw bytes
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Cid> {
        let mut hasher = Self::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize(Codec::Raw))
    }

    pub async fn from_async_reader<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Cid> {
        let mut hasher = Self::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize(Codec::Raw))
    }
}
