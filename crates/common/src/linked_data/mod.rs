//! Content identifiers for everything Augury stores.
//!
//! A deliberately narrow slice of the multiformats family: CIDv1, the raw
//! and dag-cbor codecs, BLAKE3-256 digests and base32 text. Anything outside
//! that profile is a decode error, never a silent fallback.

mod cid;
mod hasher;
pub mod multibase;

pub use self::cid::{Cid, CidError, Codec, BLAKE3, CID_LEN, DIGEST_LEN, VERSION};
pub use hasher::CidHasher;
