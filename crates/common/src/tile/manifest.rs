use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::linked_data::{Cid, CidError};

pub const DEFAULT_TILE_NAME: &str = "Unnamed Tile";
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";
pub const TILE_SCHEME: &str = "web+tile";

/// A single file in a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub src: Cid,
    #[serde(rename = "mediaType")]
    pub media_type: String,
}

/// Descriptive fields supplied by whoever builds the tile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMeta {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Immutable description of a static site: every path it serves and the
/// content behind each one.
///
/// Resource keys are absolute paths. `/` is present whenever
/// `/index.html` is, as its own copy of that entry.
// Fields are declared in DAG-CBOR key order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Manifest {
    pub fn new(meta: &TileMeta) -> Self {
        Self {
            name: meta
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_TILE_NAME.to_string()),
            resources: BTreeMap::new(),
            description: meta.description.clone(),
        }
    }

    /// Encode as canonical DAG-CBOR and address the result
    pub fn tile(&self) -> Result<Tile, CidError> {
        let (cid, bytes) = Cid::from_dag(self)?;
        Ok(Tile {
            url: tile_url(&cid),
            cid,
            bytes,
        })
    }
}

/// The addressed, serialized form of a [`Manifest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub cid: Cid,
    pub bytes: Vec<u8>,
    pub url: String,
}

pub fn tile_url(cid: &Cid) -> String {
    format!("{}://{}/", TILE_SCHEME, cid)
}

/// Best guess at a media type from the file name
pub fn media_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_MEDIA_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipld_core::ipld::Ipld;

    #[test]
    fn test_default_name() {
        let manifest = Manifest::new(&TileMeta::default());
        assert_eq!(manifest.name, DEFAULT_TILE_NAME);
        assert!(manifest.description.is_none());
    }

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for("/index.html"), "text/html");
        assert_eq!(media_type_for("/style.css"), "text/css");
        assert_eq!(media_type_for("/img/logo.png"), "image/png");
        assert_eq!(media_type_for("/LICENSE"), DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn test_tile_encodes_links() {
        let mut manifest = Manifest::new(&TileMeta {
            name: Some("Demo".into()),
            description: Some("A demo tile".into()),
        });
        let src = Cid::from_raw(b"<h1>hi</h1>");
        manifest.resources.insert(
            "/index.html".into(),
            Resource {
                src,
                media_type: "text/html".into(),
            },
        );

        let tile = manifest.tile().unwrap();
        assert_eq!(tile.url, format!("web+tile://{}/", tile.cid));
        assert_eq!(tile.cid, Cid::from_dag(&manifest).unwrap().0);

        let decoded: Ipld = serde_ipld_dagcbor::from_slice(&tile.bytes).unwrap();
        let Ipld::Map(top) = decoded else {
            panic!("manifest is not a map");
        };
        assert_eq!(top.get("name"), Some(&Ipld::String("Demo".into())));
        let Some(Ipld::Map(resources)) = top.get("resources") else {
            panic!("missing resources");
        };
        let Some(Ipld::Map(index)) = resources.get("/index.html") else {
            panic!("missing /index.html");
        };
        assert_eq!(index.get("src"), Some(&Ipld::Link(src.into())));
        assert_eq!(
            index.get("mediaType"),
            Some(&Ipld::String("text/html".into()))
        );

        let back: Manifest = serde_ipld_dagcbor::from_slice(&tile.bytes).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_json_uses_text_cids() {
        let mut manifest = Manifest::new(&TileMeta::default());
        let src = Cid::from_raw(b"x");
        manifest.resources.insert(
            "/x".into(),
            Resource {
                src,
                media_type: DEFAULT_MEDIA_TYPE.into(),
            },
        );
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["resources"]["/x"]["src"], src.to_string());
        assert_eq!(json["resources"]["/x"]["mediaType"], DEFAULT_MEDIA_TYPE);
        assert!(json.get("description").is_none());
    }
}
