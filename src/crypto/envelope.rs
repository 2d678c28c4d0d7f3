//! Envelope content encryption
//!
//! Seals message bytes from one X25519 key pair to another with HPKE in
//! Auth mode, so the recipient learns both the plaintext and that it came
//! from the holder of the sender's static key.
//!
//! HPKE Configuration:
//! - Mode: Auth (0x02)
//! - KEM: DHKEM(X25519, HKDF-SHA256) - 0x0020
//! - KDF: HKDF-SHA256 - 0x0001
//! - AEAD: AES-256-GCM - 0x0002
//!
//! ```text
//! info              = b"TAPQUEST_ENVELOPE_V1" || sender_pk(32) || recipient_pk(32)
//! encryptedContents = base64url(enc(32) || ciphertext_with_tag)
//! ```

use hpke::{
    aead::AesGcm256, kdf::HkdfSha256, kem::X25519HkdfSha256, Deserializable, Kem, OpModeR, OpModeS,
    Serializable,
};
use rand::rngs::OsRng;

use crate::crypto::hash::DOMAIN_ENVELOPE_INFO;

/// HPKE type aliases for clarity
type HpkeKem = X25519HkdfSha256;
type HpkeKdf = HkdfSha256;
type HpkeAead = AesGcm256;

/// X25519 public key (32 bytes)
pub type EnvelopePublicKey = [u8; 32];

/// X25519 private key (32 bytes)
pub type EnvelopeSecretKey = [u8; 32];

/// Length of an X25519 key
pub const ENVELOPE_KEY_SIZE: usize = 32;

/// HPKE encapsulated key size (32 bytes for X25519)
pub const HPKE_ENC_SIZE: usize = 32;

/// AES-256-GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// Error type for envelope encryption operations
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid ciphertext length")]
    InvalidCiphertext,

    #[error("invalid encoding")]
    InvalidEncoding,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("HPKE error: {0}")]
    HpkeError(String),
}

/// Build the HPKE `info` binding both parties.
fn envelope_info(sender_pk: &[u8], recipient_pk: &[u8]) -> Vec<u8> {
    let mut info =
        Vec::with_capacity(DOMAIN_ENVELOPE_INFO.len() + sender_pk.len() + recipient_pk.len());
    info.extend_from_slice(DOMAIN_ENVELOPE_INFO);
    info.extend_from_slice(sender_pk);
    info.extend_from_slice(recipient_pk);
    info
}

/// Interpret a byte slice as an X25519 key
pub fn envelope_key_from_slice(bytes: &[u8]) -> Result<[u8; 32], EncryptionError> {
    bytes.try_into().map_err(|_| {
        EncryptionError::InvalidKey(format!(
            "expected {} bytes, got {}",
            ENVELOPE_KEY_SIZE,
            bytes.len()
        ))
    })
}

// ============================================================================
// Seal / Open
// ============================================================================

/// Encrypt `plaintext` from `sender_secret_key` to `recipient_public_key`.
///
/// Returns the `encryptedContents` string (base64url of `enc || ct`).
pub fn seal_contents(
    plaintext: &[u8],
    sender_secret_key: &EnvelopeSecretKey,
    recipient_public_key: &EnvelopePublicKey,
) -> Result<String, EncryptionError> {
    let sk_s = <HpkeKem as Kem>::PrivateKey::from_bytes(sender_secret_key)
        .map_err(|e| EncryptionError::InvalidKey(format!("sender private key: {:?}", e)))?;
    let pk_s = HpkeKem::sk_to_pk(&sk_s);
    let pk_r = <HpkeKem as Kem>::PublicKey::from_bytes(recipient_public_key)
        .map_err(|e| EncryptionError::InvalidKey(format!("recipient public key: {:?}", e)))?;

    let info = envelope_info(&pk_s.to_bytes(), recipient_public_key);

    let (enc, mut sender_ctx) = hpke::setup_sender::<HpkeAead, HpkeKdf, HpkeKem, _>(
        &OpModeS::Auth((sk_s, pk_s)),
        &pk_r,
        &info,
        &mut OsRng,
    )
    .map_err(|e| EncryptionError::HpkeError(format!("HPKE setup failed: {:?}", e)))?;

    // `info` already binds both keys; AAD stays empty
    let ct = sender_ctx
        .seal(plaintext, b"")
        .map_err(|e| EncryptionError::EncryptionFailed(format!("HPKE seal failed: {:?}", e)))?;

    let enc_bytes = enc.to_bytes();
    let mut blob = Vec::with_capacity(enc_bytes.len() + ct.len());
    blob.extend_from_slice(&enc_bytes);
    blob.extend_from_slice(&ct);
    Ok(base64_url_encode(&blob))
}

/// Decrypt `encryptedContents` addressed to `recipient_secret_key`,
/// authenticating it as sent by `sender_public_key`.
pub fn open_contents(
    contents: &str,
    recipient_secret_key: &EnvelopeSecretKey,
    sender_public_key: &EnvelopePublicKey,
) -> Result<Vec<u8>, EncryptionError> {
    let blob = base64_url_decode(contents)?;
    if blob.len() < HPKE_ENC_SIZE + TAG_SIZE {
        return Err(EncryptionError::InvalidCiphertext);
    }
    let (enc, ct) = blob.split_at(HPKE_ENC_SIZE);

    let enc_key = <HpkeKem as Kem>::EncappedKey::from_bytes(enc)
        .map_err(|e| EncryptionError::HpkeError(format!("invalid encapped key: {:?}", e)))?;
    let sk_r = <HpkeKem as Kem>::PrivateKey::from_bytes(recipient_secret_key)
        .map_err(|e| EncryptionError::InvalidKey(format!("recipient private key: {:?}", e)))?;
    let pk_r = HpkeKem::sk_to_pk(&sk_r);
    let pk_s = <HpkeKem as Kem>::PublicKey::from_bytes(sender_public_key)
        .map_err(|e| EncryptionError::InvalidKey(format!("sender public key: {:?}", e)))?;

    let info = envelope_info(sender_public_key, &pk_r.to_bytes());

    let mut receiver_ctx = hpke::setup_receiver::<HpkeAead, HpkeKdf, HpkeKem>(
        &OpModeR::Auth(pk_s),
        &sk_r,
        &enc_key,
        &info,
    )
    .map_err(|e| EncryptionError::HpkeError(format!("HPKE receiver setup failed: {:?}", e)))?;

    receiver_ctx
        .open(ct, b"")
        .map_err(|e| EncryptionError::DecryptionFailed(format!("HPKE open failed: {:?}", e)))
}

// ============================================================================
// Key Management
// ============================================================================

/// Generate a new X25519 key pair
///
/// Returns: (private_key, public_key)
pub fn generate_envelope_keypair() -> (EnvelopeSecretKey, EnvelopePublicKey) {
    let (sk, pk) = HpkeKem::gen_keypair(&mut OsRng);

    let mut private_key = [0u8; 32];
    let mut public_key = [0u8; 32];

    private_key.copy_from_slice(&sk.to_bytes());
    public_key.copy_from_slice(&pk.to_bytes());

    (private_key, public_key)
}

/// Derive the X25519 public key from a private key
pub fn derive_envelope_public_key(
    private_key: &EnvelopeSecretKey,
) -> Result<EnvelopePublicKey, EncryptionError> {
    let sk = <HpkeKem as Kem>::PrivateKey::from_bytes(private_key)
        .map_err(|e| EncryptionError::InvalidKey(format!("private key: {:?}", e)))?;

    let pk = HpkeKem::sk_to_pk(&sk);

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&pk.to_bytes());
    Ok(public_key)
}

// ============================================================================
// Base64url Encoding/Decoding
// ============================================================================

/// Encode bytes as base64url without padding
pub fn base64_url_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, data)
}

/// Decode base64url (with or without padding)
pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, EncryptionError> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, s)
        .or_else(|_| base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, s))
        .map_err(|_| EncryptionError::InvalidEncoding)
}

// ============================================================================
// Tests
// ============================================================================
