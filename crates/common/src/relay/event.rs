use serde::{Deserialize, Serialize};

use nostr::JsonUtil;

/// Joins a tag's name and first value in the flattened tag index
pub const TAG_SEPARATOR: &str = "$__$";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("event id does not match its content")]
    InvalidId,
    #[error("bad signature")]
    InvalidSignature,
}

/// A signed event as it travels over the wire (NIP-01 field names).
///
/// Kept as plain strings so stored and relayed events are byte-for-byte
/// what the author published. [`RelayEvent::verify`] does the cryptography.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl RelayEvent {
    /// Check that the id is derived from the content and that `pubkey`
    /// signed it.
    pub fn verify(&self) -> Result<(), EventError> {
        if !is_lower_hex(&self.id, 64) {
            return Err(EventError::Malformed("id must be 32 bytes of lowercase hex".into()));
        }
        if !is_lower_hex(&self.pubkey, 64) {
            return Err(EventError::Malformed(
                "pubkey must be 32 bytes of lowercase hex".into(),
            ));
        }
        if !is_lower_hex(&self.sig, 128) {
            return Err(EventError::Malformed("sig must be 64 bytes of lowercase hex".into()));
        }

        let json = serde_json::to_string(self).map_err(|e| EventError::Malformed(e.to_string()))?;
        let event =
            nostr::Event::from_json(&json).map_err(|e| EventError::Malformed(e.to_string()))?;
        if !event.verify_id() {
            return Err(EventError::InvalidId);
        }
        if !event.verify_signature() {
            return Err(EventError::InvalidSignature);
        }
        Ok(())
    }

    /// Flattened `name + SEP + value` entries, one per tag.
    /// A tag with no value indexes as `name + SEP`.
    pub fn indexed_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .tags
            .iter()
            .filter_map(|tag| {
                let name = tag.first()?;
                let value = tag.get(1).map(String::as_str).unwrap_or("");
                Some(index_key(name, value))
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn has_tag(&self, name: &str, value: &str) -> bool {
        self.tags.iter().any(|tag| {
            tag.first().map(String::as_str) == Some(name)
                && tag.get(1).map(String::as_str).unwrap_or("") == value
        })
    }
}

pub fn index_key(name: &str, value: &str) -> String {
    format!("{}{}{}", name, TAG_SEPARATOR, value)
}
