//! Tap attestation domain types.

use serde::{Deserialize, Serialize};

use super::types::{bytes_hex, PublicKey, SignerCategory};

/// The byte string a secure element signs on every tap.
///
/// ```text
/// counter_message = prefix || U32_BE(nonce) || randomness
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterMessage {
    #[serde(with = "bytes_hex")]
    prefix: Vec<u8>,
    nonce: u32,
    #[serde(with = "bytes_hex")]
    randomness: Vec<u8>,
}

impl CounterMessage {
    pub fn new(prefix: impl Into<Vec<u8>>, nonce: u32, randomness: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            nonce,
            randomness: randomness.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Monotonic tap counter embedded by the chip
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn randomness(&self) -> &[u8] {
        &self.randomness
    }

    /// Encode to the exact bytes the chip signed
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.prefix.len() + 4 + self.randomness.len());
        bytes.extend_from_slice(&self.prefix);
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.randomness);
        bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// A verified claim that a signer key was physically tapped.
///
/// Created by the tap verifier (or rebuilt from a decrypted envelope and
/// re-verified); there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapAttestation {
    signer_public_key: PublicKey,
    counter_message: CounterMessage,
    #[serde(with = "bytes_hex")]
    signature: Vec<u8>,
    category: SignerCategory,
}

impl TapAttestation {
    pub fn new(
        signer_public_key: PublicKey,
        counter_message: CounterMessage,
        signature: Vec<u8>,
        category: SignerCategory,
    ) -> Self {
        Self {
            signer_public_key,
            counter_message,
            signature,
            category,
        }
    }

    pub fn signer_public_key(&self) -> &PublicKey {
        &self.signer_public_key
    }

    pub fn counter_message(&self) -> &CounterMessage {
        &self.counter_message
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn category(&self) -> SignerCategory {
        self.category
    }

    pub fn nonce(&self) -> u32 {
        self.counter_message.nonce
    }
}
