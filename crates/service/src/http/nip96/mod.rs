//! NIP-96 file storage: uploads, deletions and the discovery document.

pub mod capabilities;
pub mod delete;
pub mod redirect;
pub mod upload;

/// `bafy….png` → `bafy…`; clients like to append the file extension
pub fn strip_extension(requested: &str) -> &str {
    match requested.rsplit_once('.') {
        Some((stem, ext))
            if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') =>
        {
            stem
        }
        _ => requested,
    }
}
