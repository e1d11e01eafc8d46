//! Body digests for stored payloads.

use sha2::{Digest, Sha256};

/// SHA-256 of a stored body, hex encoded.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// True when `body` still hashes to `digest`.
pub fn verify(body: &[u8], digest: &str) -> bool {
    body_digest(body) == digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stability() {
        assert_eq!(body_digest(b"poster"), body_digest(b"poster"));
        assert_ne!(body_digest(b"poster"), body_digest(b"poster2"));
    }

    #[test]
    fn test_digest_format() {
        let digest = body_digest(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify() {
        let digest = body_digest(b"frame");
        assert!(verify(b"frame", &digest));
        assert!(!verify(b"frames", &digest));
    }
}
