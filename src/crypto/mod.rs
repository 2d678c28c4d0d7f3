//! Cryptographic utilities for tapquest
//!
//! Provides:
//! - Counter-message codec for NFC secure-element taps
//! - Tap signature verification (ECDSA secp256k1 / P-256)
//! - Envelope content encryption (HPKE Auth, X25519/HKDF-SHA256/AES-256-GCM)
//! - Encryption-at-rest sealing for store snapshots
//! - Canonical JSON and domain-separated hashing

mod counter;
mod envelope;
mod hash;
mod seal;
mod tap;


pub use counter::*;
pub use envelope::*;
pub use hash::*;
pub use seal::{
    generate_seal_key, is_sealed, seal, unseal, SealError, SealKey, TAPQUEST_SEAL_MAGIC_V1,
};
pub use tap::*;
