use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nostr::{EventBuilder, JsonUtil, Keys, Kind, Tag, Timestamp};

use crate::relay::auth::HTTP_AUTH_KIND;
use crate::relay::RelayEvent;

/// A throwaway keypair that signs events for tests
#[derive(Clone)]
pub struct TestSigner {
    keys: Keys,
}

impl TestSigner {
    pub fn generate() -> Self {
        Self {
            keys: Keys::generate(),
        }
    }

    /// Hex-encoded public key, as it appears in events
    pub fn pubkey(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Sign an event with the given kind, content, tags and timestamp
    pub fn event(&self, kind: u32, content: &str, tags: &[&[&str]], created_at: i64) -> RelayEvent {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|parts| Tag::parse(parts.iter().map(|p| p.to_string())).expect("valid tag"))
            .collect();
        let kind = u16::try_from(kind).expect("kind fits in u16");
        let event = EventBuilder::new(Kind::from(kind), content)
            .tags(tags)
            .custom_created_at(Timestamp::from(created_at as u64))
            .sign_with_keys(&self.keys)
            .expect("event signs");
        serde_json::from_str(&event.as_json()).expect("nostr event is a relay event")
    }

    /// A complete `Authorization` header value for `method` on `url`
    pub fn auth_header(&self, method: &str, url: &str, created_at: i64) -> String {
        let event = self.event(
            HTTP_AUTH_KIND,
            "",
            &[&["u", url], &["method", method]],
            created_at,
        );
        Self::header_for(&event)
    }

    /// Wrap any event as an `Authorization` header value
    pub fn header_for(event: &RelayEvent) -> String {
        let json = serde_json::to_string(event).expect("event serializes");
        format!("Nostr {}", STANDARD.encode(json))
    }
}
