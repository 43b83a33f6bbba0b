use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::multibase;

/// CIDv1
pub const VERSION: u8 = 0x01;
/// Multihash code for BLAKE3
pub const BLAKE3: u8 = 0x1e;
/// Digest length in bytes
pub const DIGEST_LEN: usize = 32;
/// Length of the binary form: four header bytes and the digest
pub const CID_LEN: usize = 4 + DIGEST_LEN;

const LEGACY_V0_LEN: usize = 46;
const LEGACY_V0_PREFIX: &str = "Qm";
const LEGACY_V0_FIRST_BYTE: u8 = 0x12;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CidError {
    #[error("legacy CIDv0 identifiers are not supported")]
    LegacyV0,
    #[error("unsupported multibase prefix: {0:?}")]
    BasePrefix(char),
    #[error("invalid base32 character: {0:?}")]
    InvalidCharacter(char),
    #[error("trailing bits after base32 decode")]
    TrailingBits,
    #[error("unsupported CID version: {0}")]
    Version(u8),
    #[error("unsupported codec: 0x{0:02x}")]
    Codec(u8),
    #[error("unsupported hash function: 0x{0:02x}")]
    HashFunction(u8),
    #[error("unsupported digest length: {0}")]
    HashLength(u8),
    #[error("invalid CID length: {0} bytes")]
    Length(usize),
    #[error("empty CID")]
    Empty,
    #[error("encode error: {0}")]
    Encode(String),
}

/// The two content codecs we mint identifiers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// Opaque bytes
    Raw,
    /// Canonical DAG-CBOR
    DagCbor,
}

impl Codec {
    pub fn code(&self) -> u8 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagCbor => 0x71,
        }
    }
}

impl TryFrom<u8> for Codec {
    type Error = CidError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x55 => Ok(Codec::Raw),
            0x71 => Ok(Codec::DagCbor),
            other => Err(CidError::Codec(other)),
        }
    }
}

/// A content identifier: CIDv1, raw or dag-cbor, BLAKE3-256.
///
/// Every header field (version, codec, hash function, digest length) is
/// read as a single byte. Multi-byte varints are valid in the wider CID
/// format but never produced by this profile, so any header byte with the
/// continuation bit set is rejected as an unsupported value for that field.
///
/// The text form is the multibase `b` prefix followed by lowercase, unpadded
/// base32 of the 36 byte binary form, 59 characters in total.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    codec: Codec,
    digest: [u8; DIGEST_LEN],
}

impl Cid {
    pub fn new(codec: Codec, digest: [u8; DIGEST_LEN]) -> Self {
        Self { codec, digest }
    }

    /// Identify opaque bytes
    pub fn from_raw(bytes: &[u8]) -> Self {
        Self::new(Codec::Raw, *blake3::hash(bytes).as_bytes())
    }

    /// Encode `value` as canonical DAG-CBOR and identify the encoding.
    /// The encoded bytes are returned alongside so callers can store them.
    pub fn from_dag<T: Serialize + ?Sized>(value: &T) -> Result<(Self, Vec<u8>), CidError> {
        let bytes =
            serde_ipld_dagcbor::to_vec(value).map_err(|e| CidError::Encode(e.to_string()))?;
        let cid = Self::new(Codec::DagCbor, *blake3::hash(&bytes).as_bytes());
        Ok((cid, bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CidError> {
        let (&version, rest) = bytes.split_first().ok_or(CidError::Empty)?;
        if version == LEGACY_V0_FIRST_BYTE {
            return Err(CidError::LegacyV0);
        }
        if version != VERSION {
            return Err(CidError::Version(version));
        }

        let mut header = rest.iter().copied();
        let codec = header
            .next()
            .ok_or(CidError::Length(bytes.len()))
            .and_then(Codec::try_from)?;
        match header.next() {
            Some(BLAKE3) => {}
            Some(other) => return Err(CidError::HashFunction(other)),
            None => return Err(CidError::Length(bytes.len())),
        }
        match header.next() {
            Some(len) if len as usize == DIGEST_LEN => {}
            Some(other) => return Err(CidError::HashLength(other)),
            None => return Err(CidError::Length(bytes.len())),
        }
        if bytes.len() != CID_LEN {
            return Err(CidError::Length(bytes.len()));
        }

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[4..]);
        Ok(Self { codec, digest })
    }

    pub fn to_bytes(&self) -> [u8; CID_LEN] {
        let mut out = [0u8; CID_LEN];
        out[0] = VERSION;
        out[1] = self.codec.code();
        out[2] = BLAKE3;
        out[3] = DIGEST_LEN as u8;
        out[4..].copy_from_slice(&self.digest);
        out
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&multibase::encode(&self.to_bytes()))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self)
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == LEGACY_V0_LEN && s.starts_with(LEGACY_V0_PREFIX) {
            return Err(CidError::LegacyV0);
        }
        let bytes = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl From<Cid> for ::cid::Cid {
    fn from(value: Cid) -> Self {
        // Our binary form is always a valid CIDv1
        let bytes = value.to_bytes();
        let hash = ::cid::multihash::Multihash::<64>::wrap(BLAKE3 as u64, &bytes[4..])
            .unwrap_or_default();
        ::cid::Cid::new_v1(value.codec.code() as u64, hash)
    }
}

impl TryFrom<::cid::Cid> for Cid {
    type Error = CidError;

    fn try_from(value: ::cid::Cid) -> Result<Self, Self::Error> {
        Self::from_bytes(&value.to_bytes())
    }
}

impl TryFrom<&::cid::Cid> for Cid {
    type Error = CidError;

    fn try_from(value: &::cid::Cid) -> Result<Self, Self::Error> {
        Self::from_bytes(&value.to_bytes())
    }
}

// Strings for JSON and TOML, IPLD links (tag 42) for DAG-CBOR
impl Serialize for Cid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            ::cid::Cid::from(*self).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Cid::from_str(&s).map_err(serde::de::Error::custom)
        } else {
            let link = ::cid::Cid::deserialize(deserializer)?;
            Cid::try_from(link).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &str = "bafkr4idcy33utsake6atvbagnojkn7odp7mdo6n7tvspd4ndnewphj67xu";
    const ZERO_RAW: &str = "bafkr4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ZERO_DAG: &str = "bafyr4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn test_decode_known_identifier() {
        let cid: Cid = KNOWN.parse().unwrap();
        assert_eq!(cid.codec(), Codec::Raw);
        assert_eq!(
            hex::encode(cid.digest()),
            "62c6f749c80a27813a84066b92a6fdc37fd83779bf9d64f1f1a3692cf3a7dfbd"
        );
        assert_eq!(hex::encode(&cid.to_bytes()[..4]), "01551e20");
        assert_eq!(cid.to_string(), KNOWN);
        assert_eq!(cid.to_string().len(), 59);
    }

    #[test]
    fn test_from_raw() {
        let cid = Cid::from_raw(b"This file now intentionally left blank.");
        assert_eq!(
            cid.to_string(),
            "bafkr4ib47dntyr4jhcgcbx3wknk7okpidiuikc6x4ulsvurlrzsgxpmjlm"
        );
        assert_eq!(
            hex::encode(cid.digest()),
            "3cf8db3c4789388c20df765355f729e81a28850bd7e5172ad22b8e646bbd895b"
        );
    }

    #[test]
    fn test_codecs_share_digest_but_not_text() {
        let raw: Cid = ZERO_RAW.parse().unwrap();
        let dag: Cid = ZERO_DAG.parse().unwrap();
        assert_eq!(raw.digest(), dag.digest());
        assert_eq!(dag.codec(), Codec::DagCbor);
        assert_ne!(raw, dag);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (
                "bajkr4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                CidError::Version(2),
            ),
            (
                "bafyb4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                CidError::Codec(0x70),
            ),
            (
                "bafkreiaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                CidError::HashFunction(0x12),
            ),
            (
                "bafkr4eaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                CidError::HashLength(0x10),
            ),
            ("bafkr4iaaaaaaaaaaaaaaaaaaaaaaaaaa", CidError::Length(20)),
            (
                "bafkr4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaab",
                CidError::TrailingBits,
            ),
            (
                "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
                CidError::LegacyV0,
            ),
            (
                "Bafkr4iaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                CidError::BasePrefix('B'),
            ),
            ("bafkr4i0", CidError::InvalidCharacter('0')),
            ("", CidError::Empty),
        ];
        for (text, expected) in cases {
            assert_eq!(text.parse::<Cid>().unwrap_err(), expected, "{text}");
        }
    }

    #[test]
    fn test_binary_rejections() {
        let mut bytes = Cid::from_raw(b"x").to_bytes().to_vec();
        bytes[0] = LEGACY_V0_FIRST_BYTE;
        assert_eq!(Cid::from_bytes(&bytes).unwrap_err(), CidError::LegacyV0);

        let mut bytes = Cid::from_raw(b"x").to_bytes().to_vec();
        bytes[1] = 0x80;
        assert_eq!(Cid::from_bytes(&bytes).unwrap_err(), CidError::Codec(0x80));

        let mut bytes = Cid::from_raw(b"x").to_bytes().to_vec();
        bytes.push(0);
        assert_eq!(Cid::from_bytes(&bytes).unwrap_err(), CidError::Length(37));

        assert_eq!(Cid::from_bytes(&[]).unwrap_err(), CidError::Empty);
        assert_eq!(Cid::from_bytes(&[1]).unwrap_err(), CidError::Length(1));
    }

    #[test]
    fn test_round_trips_through_bytes_and_ecosystem_type() {
        let cid = Cid::from_raw(b"round trip");
        assert_eq!(Cid::from_bytes(&cid.to_bytes()).unwrap(), cid);

        let ecosystem = ::cid::Cid::from(cid);
        assert_eq!(ecosystem.version(), ::cid::Version::V1);
        assert_eq!(ecosystem.codec(), 0x55);
        assert_eq!(ecosystem.hash().code(), 0x1e);
        assert_eq!(ecosystem.to_bytes(), cid.to_bytes().to_vec());
        assert_eq!(Cid::try_from(ecosystem).unwrap(), cid);
    }

    #[test]
    fn test_serde_json_is_a_string() {
        let cid = Cid::from_raw(b"json");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", cid));
        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }

    #[test]
    fn test_dag_cbor_is_a_link() {
        let cid = Cid::from_raw(b"link");
        let bytes = serde_ipld_dagcbor::to_vec(&cid).unwrap();
        // CBOR tag 42
        assert_eq!(&bytes[..2], &[0xd8, 0x2a]);
        let back: Cid = serde_ipld_dagcbor::from_slice(&bytes).unwrap();
        assert_eq!(back, cid);
    }

    #[test]
    fn test_from_dag_is_deterministic() {
        let mut a = std::collections::BTreeMap::new();
        a.insert("b", 2);
        a.insert("a", 1);
        let (cid_a, bytes_a) = Cid::from_dag(&a).unwrap();
        let (cid_b, bytes_b) = Cid::from_dag(&a).unwrap();
        assert_eq!(cid_a, cid_b);
        assert_eq!(bytes_a, bytes_b);
        assert_eq!(cid_a.codec(), Codec::DagCbor);
    }
}
