//! Content digests for stored entry bodies.

use sha2::{Digest, Sha256};

/// SHA-256 digest of a response body, hex encoded.
///
/// Stored beside each entry so revalidation can tell a refreshed body from an
/// unchanged one.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stability() {
        assert_eq!(body_digest(b"hello"), body_digest(b"hello"));
    }

    #[test]
    fn test_digest_differs() {
        assert_ne!(body_digest(b"v1"), body_digest(b"v2"));
    }

    #[test]
    fn test_digest_format() {
        let digest = body_digest(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }
}
