//! Tiles: reproducible, content-addressed manifests of a static site.

mod builder;
mod manifest;

pub use builder::{ManifestBuilder, ManifestUpdate, INDEX_PATH, ROOT_PATH};
pub use manifest::{
    media_type_for, tile_url, Manifest, Resource, Tile, TileMeta, DEFAULT_MEDIA_TYPE,
    DEFAULT_TILE_NAME, TILE_SCHEME,
};
