use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use common::prelude::{
    CidError, Manifest, ManifestBuilder, Tile as BuiltTile, TileMeta, WatcherError,
};
use service::process::init_tracing;

/// Build the tile of a static site directory
#[derive(Args, Debug, Clone)]
pub struct Tile {
    /// Site root
    pub path: PathBuf,

    /// Keep watching and report a new tile after every change
    #[arg(long)]
    pub watch: bool,

    /// Write the DAG-CBOR encoded manifest here
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("failed to scan site: {0}")]
    Watcher(#[from] WatcherError),
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] CidError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to render manifest: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(std::io::Error),
}

#[derive(Serialize)]
struct TileSummary<'a> {
    cid: String,
    url: &'a str,
    manifest: &'a Manifest,
}

impl Tile {
    fn meta(&self) -> TileMeta {
        TileMeta {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    fn write_out(&self, tile: &BuiltTile) -> Result<(), TileError> {
        if let Some(out) = &self.out {
            write_bytes(out, &tile.bytes)?;
        }
        Ok(())
    }

    async fn follow(&self, builder: &ManifestBuilder) -> Result<(), TileError> {
        let updates = builder.subscribe();
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map_err(TileError::Signal)?;
                    return Ok(());
                }
                update = updates.recv_async() => {
                    let Ok(update) = update else { return Ok(()) };
                    let tile = update.manifest.tile()?;
                    self.write_out(&tile)?;
                    tracing::info!(kind = update.kind.as_str(), path = %update.path, "site changed");
                    println!("{} {} {}", update.kind.as_str(), update.path, tile.url);
                }
            }
        }
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), TileError> {
    std::fs::write(path, bytes).map_err(|source| TileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Tile {
    type Error = TileError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let builder = ManifestBuilder::new(&self.path, self.meta());

        if !self.watch {
            let manifest = builder.generate().await?;
            let tile = manifest.tile()?;
            self.write_out(&tile)?;
            let summary = TileSummary {
                cid: tile.cid.to_string(),
                url: &tile.url,
                manifest: &manifest,
            };
            return Ok(serde_json::to_string_pretty(&summary)?);
        }

        let _guard = init_tracing(tracing::Level::INFO);
        builder.watch().await?;
        let tile = builder.tile()?;
        self.write_out(&tile)?;
        tracing::info!(root = %self.path.display(), "watching site");
        println!("{}", tile.url);

        let result = self.follow(&builder).await;
        builder.stop();
        result?;
        Ok(builder.tile()?.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};

    #[tokio::test]
    async fn test_one_shot_tile() {
        let site = tempfile::tempdir().unwrap();
        std::fs::write(site.path().join("index.html"), b"<h1>hi</h1>").unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let out = scratch.path().join("site.tile");

        let op = Tile {
            path: site.path().to_path_buf(),
            watch: false,
            out: Some(out.clone()),
            name: Some("Hello".into()),
            description: None,
        };
        let ctx = OpContext::new(None).unwrap();
        let output = op.execute(&ctx).await.unwrap();

        let summary: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(summary["url"].as_str().unwrap().starts_with("web+tile://bafyr4"));
        assert_eq!(summary["manifest"]["name"], "Hello");
        assert_eq!(
            summary["manifest"]["resources"]["/"],
            summary["manifest"]["resources"]["/index.html"]
        );
        assert_eq!(
            summary["manifest"]["resources"]["/index.html"]["mediaType"],
            "text/html"
        );

        let bytes = std::fs::read(&out).unwrap();
        let expected = ManifestBuilder::new(site.path(), op.meta())
            .generate()
            .await
            .unwrap()
            .tile()
            .unwrap();
        assert_eq!(bytes, expected.bytes);
        assert_eq!(summary["cid"], expected.cid.to_string());
    }
}
