// crates/admission-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Secret Fingerprints
// Description: sha256 fingerprints and constant-time comparison for shared secrets.
// Purpose: Let audit records identify a presented secret without storing it.
// Dependencies: sha2, subtle
// ============================================================================

//! ## Overview
//! Fingerprints are the first 16 hex characters of the sha256 digest. They
//! are stable across restarts, so operators can correlate override use
//! with the configured secret.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hex characters kept in a fingerprint.
const FINGERPRINT_HEX_CHARS: usize = 16;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the sha256 fingerprint of a secret.
#[must_use]
pub fn secret_fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let mut encoded = hex_encode(&digest);
    encoded.truncate(FINGERPRINT_HEX_CHARS);
    encoded
}

/// Compares two secrets in constant time (length leaks, content does not).
#[must_use]
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_prefix_of_digest() {
        assert_eq!(secret_fingerprint("abc"), "ba7816bf8f01cfea");
        assert_eq!(secret_fingerprint("abc").len(), 16);
    }

    #[test]
    fn secrets_compare_exactly() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cre"));
        assert!(!secrets_match("s3cret", "S3cret"));
    }
}
