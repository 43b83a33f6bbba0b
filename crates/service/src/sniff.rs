//! Content type detection from leading "magic" bytes.

/// Bytes of the upload kept for [`sniff`]; enough for every matcher `infer`
/// ships, including the container formats that look past the header.
pub const SNIFF_LEN: usize = 8192;

/// Guess a MIME type from the first bytes of a file
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}
