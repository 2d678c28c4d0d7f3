//! Encryption-at-rest for attestation store snapshots
//!
//! Output format: `TAPQUEST_SEAL_MAGIC_V1 || nonce(12) || ciphertext_with_tag`.
//! The AAD is fixed per blob kind so a sealed snapshot cannot be passed off
//! as another kind of sealed data.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

/// Sealing key (32 bytes for AES-256)
pub type SealKey = [u8; 32];

/// Magic prefix for sealed blobs (v1)
pub const TAPQUEST_SEAL_MAGIC_V1: &[u8; 4] = b"TQS1";

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("seal failed: {0}")]
    SealFailed(String),

    #[error("unseal failed: {0}")]
    UnsealFailed(String),

    #[error("sealed blob too short")]
    InvalidCiphertext,

    #[error("not a sealed blob")]
    InvalidFormat,
}

pub fn is_sealed(data: &[u8]) -> bool {
    data.starts_with(TAPQUEST_SEAL_MAGIC_V1)
}

/// Encrypt bytes for storage at rest.
pub fn seal(key: &SealKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| SealError::SealFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_with_tag = cipher
        .encrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| SealError::SealFailed(e.to_string()))?;

    let mut result =
        Vec::with_capacity(TAPQUEST_SEAL_MAGIC_V1.len() + NONCE_SIZE + ciphertext_with_tag.len());
    result.extend_from_slice(TAPQUEST_SEAL_MAGIC_V1);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext_with_tag);
    Ok(result)
}

pub fn unseal(key: &SealKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, SealError> {
    let header_len = TAPQUEST_SEAL_MAGIC_V1.len() + NONCE_SIZE;
    if sealed.len() < header_len + TAG_SIZE {
        return Err(SealError::InvalidCiphertext);
    }
    if !is_sealed(sealed) {
        return Err(SealError::InvalidFormat);
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| SealError::UnsealFailed(e.to_string()))?;

    let nonce_start = TAPQUEST_SEAL_MAGIC_V1.len();
    let nonce = Nonce::from_slice(&sealed[nonce_start..header_len]);

    cipher
        .decrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: &sealed[header_len..],
                aad,
            },
        )
        .map_err(|e| SealError::UnsealFailed(e.to_string()))
}

/// Generate a new random sealing key
pub fn generate_seal_key() -> SealKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_roundtrip() {
        let key = generate_seal_key();
        let sealed = seal(&key, b"aad", br#"{"hello":"world"}"#).unwrap();
        assert!(is_sealed(&sealed));

        let opened = unseal(&key, b"aad", &sealed).unwrap();
        assert_eq!(opened, br#"{"hello":"world"}"#);
    }

    #[test]
    fn test_wrong_key_or_aad_fails() {
        let key = generate_seal_key();
        let sealed = seal(&key, b"aad", b"secret").unwrap();

        assert!(unseal(&generate_seal_key(), b"aad", &sealed).is_err());
        assert!(unseal(&key, b"other", &sealed).is_err());
    }

    #[test]
    fn test_bad_header_rejected() {
        let key = generate_seal_key();
        let mut sealed = seal(&key, b"", b"secret").unwrap();

        assert!(matches!(
            unseal(&key, b"", &sealed[..20]),
            Err(SealError::InvalidCiphertext)
        ));

        sealed[0] = b'X';
        assert!(matches!(unseal(&key, b"", &sealed), Err(SealError::InvalidFormat)));
    }
}
