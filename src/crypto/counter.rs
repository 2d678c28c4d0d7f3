//! Counter-message codec
//!
//! Builds and parses the byte string an NFC secure element signs on each tap:
//!
//! ```text
//! counter_message = prefix(22) || U32_BE(nonce) || randomness
//! prefix          = b"\x19Attest counter pk62:\n"
//! ```
//!
//! In hex form the nonce occupies characters 44..52. Nonce extraction is a
//! tolerant parse: truncated or garbled input yields `None`, never an error.

use crate::domain::CounterMessage;

/// Default prefix signed by deployed chips
pub const COUNTER_MESSAGE_PREFIX: &[u8] = b"\x19Attest counter pk62:\n";

/// Encoded nonce size in bytes
pub const NONCE_SIZE: usize = 4;

/// Encoded nonce size in hex characters
pub const NONCE_HEX_LEN: usize = NONCE_SIZE * 2;

/// Error type for counter-message encoding
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("counter message too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("counter message does not start with the configured prefix")]
    PrefixMismatch,
}

/// Counter-message codec bound to a prefix.
///
/// The nonce offset follows the prefix length, so a firmware revision with a
/// different tag only needs a different prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterMessageCodec {
    prefix: Vec<u8>,
}

impl Default for CounterMessageCodec {
    fn default() -> Self {
        Self::new(COUNTER_MESSAGE_PREFIX)
    }
}

impl CounterMessageCodec {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Minimum message length in bytes (prefix + nonce)
    pub fn min_len(&self) -> usize {
        self.prefix.len() + NONCE_SIZE
    }

    /// Minimum message length in hex characters
    pub fn min_hex_len(&self) -> usize {
        self.min_len() * 2
    }

    /// Build the value object for `nonce` and hex-encoded `randomness_hex`
    pub fn message(&self, nonce: u32, randomness_hex: &str) -> Result<CounterMessage, EncodingError> {
        let randomness = hex::decode(randomness_hex).map_err(|source| EncodingError::InvalidHex {
            field: "randomness",
            source,
        })?;
        Ok(CounterMessage::new(self.prefix.clone(), nonce, randomness))
    }

    /// Build the signed bytes for `nonce` and hex-encoded `randomness_hex`
    pub fn build(&self, nonce: u32, randomness_hex: &str) -> Result<Vec<u8>, EncodingError> {
        self.message(nonce, randomness_hex).map(|msg| msg.to_bytes())
    }

    /// Parse signed bytes back into a [`CounterMessage`]
    pub fn parse(&self, message: &[u8]) -> Result<CounterMessage, EncodingError> {
        if message.len() < self.min_len() {
            return Err(EncodingError::TooShort {
                expected: self.min_len(),
                actual: message.len(),
            });
        }
        if !message.starts_with(&self.prefix) {
            return Err(EncodingError::PrefixMismatch);
        }

        let offset = self.prefix.len();
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&message[offset..offset + NONCE_SIZE]);

        Ok(CounterMessage::new(
            self.prefix.clone(),
            u32::from_be_bytes(nonce),
            message[offset + NONCE_SIZE..].to_vec(),
        ))
    }

    /// Extract the nonce from signed bytes; `None` if too short
    pub fn extract_nonce(&self, message: &[u8]) -> Option<u32> {
        let offset = self.prefix.len();
        let bytes: [u8; NONCE_SIZE] = message.get(offset..offset + NONCE_SIZE)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Extract the nonce from hex-encoded bytes.
    ///
    /// `None` if the text is shorter than [`Self::min_hex_len`] or the nonce
    /// characters are not hex digits.
    pub fn extract_nonce_hex(&self, message_hex: &str) -> Option<u32> {
        let offset = self.prefix.len() * 2;
        parse_nonce_hex(message_hex.get(offset..offset + NONCE_HEX_LEN)?)
    }
}

/// Parse exactly [`NONCE_HEX_LEN`] hex digits as a big-endian u32
pub fn parse_nonce_hex(nonce_hex: &str) -> Option<u32> {
    if nonce_hex.len() != NONCE_HEX_LEN || !nonce_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(nonce_hex, 16).ok()
}

/// Build a counter message with the default prefix
pub fn build_counter_message(nonce: u32, randomness_hex: &str) -> Result<Vec<u8>, EncodingError> {
    CounterMessageCodec::default().build(nonce, randomness_hex)
}

/// Extract the nonce from a counter message with the default prefix
pub fn extract_nonce(message: &[u8]) -> Option<u32> {
    CounterMessageCodec::default().extract_nonce(message)
}

/// Extract the nonce from a hex counter message with the default prefix
pub fn extract_nonce_hex(message_hex: &str) -> Option<u32> {
    CounterMessageCodec::default().extract_nonce_hex(message_hex)
}
