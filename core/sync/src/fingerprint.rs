//! Content fingerprints sent alongside pushed documents.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Fingerprint of a document body: Base64 of BLAKE2b-256 over its UTF-8 bytes.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(content.as_bytes());
    STANDARD.encode(hasher.finalize())
}
