//! Domain separation tags and key fingerprints
//!
//! Every keyed or hashed construction carries its own tag. Fingerprints are
//! the short form keys take in log fields and CLI output.

use sha2::{Digest, Sha256};

// ============================================================================
// Domain Separation Constants
// ============================================================================

/// HPKE `info` for envelope contents
pub const DOMAIN_ENVELOPE_INFO: &[u8] = b"TAPQUEST_ENVELOPE_V1";

/// AES-GCM associated data for sealed attestation store snapshots
pub const DOMAIN_STORE_SNAPSHOT_AAD: &[u8] = b"TAPQUEST_STORE_SNAPSHOT_AAD_V1";

/// Prefix for key fingerprints
pub const DOMAIN_KEY_FINGERPRINT: &[u8] = b"TAPQUEST_KEY_FP_V1";

// ============================================================================
// Fingerprints
// ============================================================================

/// Short, stable identifier for a public key, for logs and CLI output.
///
/// ```text
/// fingerprint = hex(SHA256(b"TAPQUEST_KEY_FP_V1" || key)[..8])
/// ```
pub fn key_fingerprint(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_KEY_FINGERPRINT);
    hasher.update(key);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        let fp1 = key_fingerprint(&[4u8; 65]);
        let fp2 = key_fingerprint(&[4u8; 65]);
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 16);
        assert_ne!(fp1, key_fingerprint(&[5u8; 65]));
    }
}
