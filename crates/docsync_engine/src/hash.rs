use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the normalized markdown. Used only to detect change.
pub fn content_hash(markdown: &str) -> String {
    hex_digest(markdown.as_bytes())
}

/// Whether `markdown` hashes to the stored digest. Comparison ignores hex case.
pub fn matches_hash(markdown: &str, stored: &str) -> bool {
    content_hash(markdown).eq_ignore_ascii_case(stored)
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
