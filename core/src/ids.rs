use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 digest, the basis for exact dedup on `Content.sha256`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derives the stable `u64` id used at the content store boundary from a
/// sha256 hex digest, so every row has one identifier scheme instead of
/// mixed UUID/int keys. Takes the first 8 bytes of the digest, big-endian.
pub fn content_id_from_sha256(sha256_hex: &str) -> u64 {
    let mut buf = [0u8; 8];
    let mut nibbles = sha256_hex.chars();
    for byte in buf.iter_mut() {
        let hi = nibbles.next().and_then(|c| c.to_digit(16)).unwrap_or(0);
        let lo = nibbles.next().and_then(|c| c.to_digit(16)).unwrap_or(0);
        *byte = ((hi << 4) | lo) as u8;
    }
    u64::from_be_bytes(buf)
}

/// Convenience: hash arbitrary text and derive its content id in one step.
pub fn content_id_from_text(text: &str) -> (String, u64) {
    let sha256 = sha256_hex(text.as_bytes());
    let id = content_id_from_sha256(&sha256);
    (sha256, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }

    #[test]
    fn content_id_is_deterministic_and_sha256_is_64_hex_chars() {
        let (sha, id) = content_id_from_text("the quick brown fox");
        assert_eq!(sha.len(), 64);
        let (sha2, id2) = content_id_from_text("the quick brown fox");
        assert_eq!(sha, sha2);
        assert_eq!(id, id2);
    }
}
