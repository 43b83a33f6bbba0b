//! HTTP request authorization with signed events (NIP-98).
//!
//! The `Authorization` header carries `Nostr <base64 event>`. The event
//! must be a fresh kind 27235 event naming the exact method and URL of the
//! request, validly signed by an allow-listed author.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::event::{EventError, RelayEvent};

pub const HTTP_AUTH_KIND: u32 = 27235;
/// Allowed clock skew, in seconds, either side of now
pub const AUTH_WINDOW_SECS: i64 = 60;
pub const AUTH_SCHEME: &str = "Nostr";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No authorization string.")]
    Missing,
    #[error("Authorization is not a base64 encoded Nostr event.")]
    Malformed,
    #[error("Failure: event.kind is \"{0}\" instead of 27235.")]
    WrongKind(u32),
    #[error("No matching method tag found.")]
    MethodMismatch,
    #[error("No matching u tag found. Expected u: \"{0}\"")]
    UrlMismatch(String),
    #[error("Timestamp is not within the 60 second window.")]
    Expired,
    #[error("Event does not appear to be valid.")]
    Invalid(#[from] EventError),
    #[error("User is not accepted on this server.")]
    NotAllowed,
}

/// Decode the event from an `Authorization` header value
pub fn decode_header(header: &str) -> Result<RelayEvent, AuthError> {
    let encoded = header
        .trim()
        .strip_prefix(AUTH_SCHEME)
        .map(str::trim_start)
        .ok_or(AuthError::Malformed)?;
    if encoded.is_empty() {
        return Err(AuthError::Missing);
    }
    let bytes = STANDARD.decode(encoded).map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

/// Authorize a request, returning the author's hex pubkey.
///
/// Checks run cheapest first, so the signature is only verified for
/// events that are otherwise acceptable.
pub fn authorize(
    header: Option<&str>,
    method: &str,
    url: &str,
    allowed: &HashSet<String>,
    now: i64,
) -> Result<String, AuthError> {
    let header = header.ok_or(AuthError::Missing)?;
    let event = decode_header(header)?;

    if event.kind != HTTP_AUTH_KIND {
        return Err(AuthError::WrongKind(event.kind));
    }
    if !event.has_tag("method", method) {
        return Err(AuthError::MethodMismatch);
    }
    if !event.has_tag("u", url) {
        return Err(AuthError::UrlMismatch(url.to_string()));
    }
    if event.created_at.abs_diff(now) > AUTH_WINDOW_SECS.unsigned_abs() {
        return Err(AuthError::Expired);
    }
    event.verify()?;
    if !allowed.contains(&event.pubkey) {
        return Err(AuthError::NotAllowed);
    }
    Ok(event.pubkey)
}
