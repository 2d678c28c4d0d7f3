//! Tap signature primitives
//!
//! Secure-element chips sign counter messages with ECDSA. Two card families
//! are deployed, so the curve is a configuration value:
//! - ECDSA over secp256k1 (k256)
//! - ECDSA over NIST P-256 (p256)
//!
//! Both hash the message with SHA-256. Signatures are accepted as DER or as
//! 64-byte compact `r || s`; high-S signatures are normalized before
//! verification because chips do not enforce low-S.

use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use rand::rngs::OsRng;

/// SEC1 tag for an uncompressed point
const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Raw `x || y` coordinate length for 256-bit curves
const RAW_POINT_LEN: usize = 64;

/// Compact `r || s` signature length for 256-bit curves
const COMPACT_SIGNATURE_LEN: usize = 64;

/// Error type for tap signature operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("invalid public key format")]
    InvalidPublicKeyFormat,

    #[error("invalid secret key format")]
    InvalidSecretKeyFormat,

    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Signature scheme used by a card family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureScheme {
    #[default]
    EcdsaSecp256k1,
    EcdsaP256,
}

impl SignatureScheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secp256k1" | "k256" | "ecdsa-secp256k1" => Some(Self::EcdsaSecp256k1),
            "p256" | "p-256" | "secp256r1" | "prime256v1" | "ecdsa-p256" => Some(Self::EcdsaP256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaSecp256k1 => "secp256k1",
            Self::EcdsaP256 => "p256",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept a bare `x || y` point by restoring its SEC1 tag
pub fn normalize_public_key_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == RAW_POINT_LEN {
        let mut tagged = Vec::with_capacity(RAW_POINT_LEN + 1);
        tagged.push(SEC1_UNCOMPRESSED_TAG);
        tagged.extend_from_slice(bytes);
        tagged
    } else {
        bytes.to_vec()
    }
}

// ============================================================================
// Tap Verifying Key
// ============================================================================

/// Public key of a tap-capable chip
#[derive(Clone)]
pub enum TapVerifyingKey {
    Secp256k1(k256::ecdsa::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

impl TapVerifyingKey {
    /// Parse a SEC1-encoded (or raw 64-byte) point for `scheme`
    pub fn from_sec1_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self, SigningError> {
        let bytes = normalize_public_key_bytes(bytes);
        match scheme {
            SignatureScheme::EcdsaSecp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
                .map(Self::Secp256k1)
                .map_err(|_| SigningError::InvalidPublicKeyFormat),
            SignatureScheme::EcdsaP256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
                .map(Self::P256)
                .map_err(|_| SigningError::InvalidPublicKeyFormat),
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Secp256k1(_) => SignatureScheme::EcdsaSecp256k1,
            Self::P256(_) => SignatureScheme::EcdsaP256,
        }
    }

    /// Uncompressed SEC1 encoding (65 bytes)
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        match self {
            Self::Secp256k1(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            Self::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    /// Verify `signature` (DER or compact) over `message`
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        match self {
            Self::Secp256k1(key) => {
                let sig = parse_k256_signature(signature)?;
                key.verify(message, &sig)
                    .map_err(|_| SigningError::VerificationFailed)
            }
            Self::P256(key) => {
                let sig = parse_p256_signature(signature)?;
                key.verify(message, &sig)
                    .map_err(|_| SigningError::VerificationFailed)
            }
        }
    }
}

impl fmt::Debug for TapVerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapVerifyingKey")
            .field("scheme", &self.scheme())
            .field("public_key", &hex::encode(self.to_sec1_bytes()))
            .finish()
    }
}

fn parse_k256_signature(bytes: &[u8]) -> Result<k256::ecdsa::Signature, SigningError> {
    let sig = if bytes.len() == COMPACT_SIGNATURE_LEN {
        k256::ecdsa::Signature::from_slice(bytes)
    } else {
        k256::ecdsa::Signature::from_der(bytes)
    }
    .map_err(|_| SigningError::InvalidSignatureFormat)?;
    Ok(sig.normalize_s().unwrap_or(sig))
}

fn parse_p256_signature(bytes: &[u8]) -> Result<p256::ecdsa::Signature, SigningError> {
    let sig = if bytes.len() == COMPACT_SIGNATURE_LEN {
        p256::ecdsa::Signature::from_slice(bytes)
    } else {
        p256::ecdsa::Signature::from_der(bytes)
    }
    .map_err(|_| SigningError::InvalidSignatureFormat)?;
    Ok(sig.normalize_s().unwrap_or(sig))
}

// ============================================================================
// Tap Signing Key
// ============================================================================

/// Software stand-in for a chip's signing key.
///
/// Used to provision test cards and by the admin CLI for hardware bring-up;
/// real keys never leave the secure element.
#[derive(Clone)]
pub enum TapSigningKey {
    Secp256k1(k256::ecdsa::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

impl TapSigningKey {
    /// Generate a new random signing key
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::EcdsaSecp256k1 => {
                Self::Secp256k1(k256::ecdsa::SigningKey::random(&mut OsRng))
            }
            SignatureScheme::EcdsaP256 => Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    /// Create from 32-byte secret scalar
    pub fn from_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self, SigningError> {
        match scheme {
            SignatureScheme::EcdsaSecp256k1 => k256::ecdsa::SigningKey::from_slice(bytes)
                .map(Self::Secp256k1)
                .map_err(|_| SigningError::InvalidSecretKeyFormat),
            SignatureScheme::EcdsaP256 => p256::ecdsa::SigningKey::from_slice(bytes)
                .map(Self::P256)
                .map_err(|_| SigningError::InvalidSecretKeyFormat),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Secp256k1(key) => key.to_bytes().to_vec(),
            Self::P256(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Secp256k1(_) => SignatureScheme::EcdsaSecp256k1,
            Self::P256(_) => SignatureScheme::EcdsaP256,
        }
    }

    pub fn public_key(&self) -> TapVerifyingKey {
        match self {
            Self::Secp256k1(key) => TapVerifyingKey::Secp256k1(*key.verifying_key()),
            Self::P256(key) => TapVerifyingKey::P256(*key.verifying_key()),
        }
    }

    /// Uncompressed SEC1 public key bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_sec1_bytes()
    }

    /// Sign `message` (SHA-256 prehash), DER-encoded like the chips emit
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Secp256k1(key) => {
                let sig: k256::ecdsa::Signature = key.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
            Self::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for TapSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapSigningKey")
            .field("scheme", &self.scheme())
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Verify a signature given raw key bytes
pub fn verify_tap_signature(
    scheme: SignatureScheme,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SigningError> {
    TapVerifyingKey::from_sec1_bytes(scheme, public_key)?.verify(message, signature)
}

/// Parse hex (with or without 0x prefix)
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str)
}

// ============================================================================
// Tests
// ============================================================================
