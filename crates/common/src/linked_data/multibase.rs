//! Lowercase, unpadded RFC 4648 base32 with the multibase `b` prefix.
//!
//! This is the only multibase we speak. Encoding goes through the `multibase`
//! crate; decoding is strict: characters outside
//! the alphabet, and trailing bits that do not belong to a full byte, are
//! rejected instead of being silently dropped.

use ::cid::multibase::Base;

use super::cid::CidError;

/// Multibase prefix for lowercase base32 without padding
pub const BASE32_PREFIX: char = 'b';

const BITS_PER_CHAR: u32 = 5;

fn value_of(c: char) -> Option<u32> {
    match c {
        'a'..='z' => Some(c as u32 - 'a' as u32),
        '2'..='7' => Some(c as u32 - '2' as u32 + 26),
        _ => None,
    }
}

/// Encode bytes as base32 without the prefix.
pub fn encode_base32(bytes: &[u8]) -> String {
    Base::Base32Lower.encode(bytes)
}

/// Decode unprefixed base32 text.
pub fn decode_base32(text: &str) -> Result<Vec<u8>, CidError> {
    let mut out = Vec::with_capacity(text.len() * BITS_PER_CHAR as usize / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for c in text.chars() {
        let value = value_of(c).ok_or(CidError::InvalidCharacter(c))?;
        buffer = (buffer << BITS_PER_CHAR) | value;
        bits += BITS_PER_CHAR;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
        buffer &= (1 << bits) - 1;
    }

    // A full character of leftovers, or any set padding bit, is malformed
    if bits >= BITS_PER_CHAR || buffer != 0 {
        return Err(CidError::TrailingBits);
    }
    Ok(out)
}

/// Encode bytes with the `b` multibase prefix.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(1 + (bytes.len() * 8).div_ceil(5));
    out.push(BASE32_PREFIX);
    out.push_str(&encode_base32(bytes));
    out
}

/// Decode prefixed multibase text. Only `b` is accepted.
pub fn decode(text: &str) -> Result<Vec<u8>, CidError> {
    let mut chars = text.chars();
    match chars.next() {
        None => Err(CidError::Empty),
        Some(BASE32_PREFIX) => decode_base32(chars.as_str()),
        Some(other) => Err(CidError::BasePrefix(other)),
    }
}
