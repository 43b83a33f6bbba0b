/**
 * Content identifiers: a narrow CIDv1 profile
 *  (raw and dag-cbor codecs, BLAKE3, base32 text)
 *  and a streaming hasher that mints them.
 */
pub mod linked_data;
/**
 * Event relay wire model.
 *  - Signed events and their tag index
 *  - Subscription filters
 *  - The JSON array message protocol
 *  - HTTP authorization with signed events
 */
pub mod relay;
/**
 * Signing helpers for tests.
 */
pub mod testkit;
/**
 * Reproducible manifests ("tiles") of a static site,
 *  built once or kept current from a watched directory.
 */
pub mod tile;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;
/**
 * Live path <-> content id index of a directory tree.
 */
pub mod watcher;

pub mod prelude {
    pub use crate::linked_data::{multibase, Cid, CidError, CidHasher, Codec};
    pub use crate::relay::{ClientMessage, Filter, RelayEvent, RelayMessage};
    pub use crate::tile::{Manifest, ManifestBuilder, Tile, TileMeta};
    pub use crate::version::build_info;
    pub use crate::watcher::{Watcher, WatcherError};
}
