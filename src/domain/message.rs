//! Encrypted envelope and plaintext message types.
//!
//! The [`EncryptedEnvelope`] is the durable record that travels between
//! devices and gets persisted by the transport layer. A [`PlaintextMessage`]
//! is only ever produced by decrypting an envelope and is never stored in its
//! place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attestation::TapAttestation;
use super::types::PublicKey;

/// Message type tag for tap attestations
pub const MESSAGE_TYPE_ATTESTATION: &str = "attestation";

/// Message type tag for threshold decryption / PSI round shares
pub const MESSAGE_TYPE_DECRYPTION_SHARE: &str = "decryption-share";

/// Message type tag for free-form chat
pub const MESSAGE_TYPE_CHAT: &str = "chat";

/// Wire/storage form of an encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub to_public_key: PublicKey,
    pub from_public_key: PublicKey,
    pub from_display_name: String,
    /// base64url(HPKE enc || ciphertext)
    pub encrypted_contents: String,
    pub timestamp: DateTime<Utc>,
}

/// Round-3 share of the multi-party decryption step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionShare {
    pub message_round3: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
}

/// Typed view of a message's `data`, keyed by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Attestation(TapAttestation),
    DecryptionShare(DecryptionShare),
    Chat(ChatMessage),
    /// A type this build does not know; kept verbatim for forward compatibility
    Unknown { message_type: String, data: Value },
}

impl MessagePayload {
    pub fn message_type(&self) -> &str {
        match self {
            MessagePayload::Attestation(_) => MESSAGE_TYPE_ATTESTATION,
            MessagePayload::DecryptionShare(_) => MESSAGE_TYPE_DECRYPTION_SHARE,
            MessagePayload::Chat(_) => MESSAGE_TYPE_CHAT,
            MessagePayload::Unknown { message_type, .. } => message_type,
        }
    }

    /// Serialize the variant's body to the `data` value carried on the wire
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            MessagePayload::Attestation(attestation) => serde_json::to_value(attestation),
            MessagePayload::DecryptionShare(share) => serde_json::to_value(share),
            MessagePayload::Chat(chat) => serde_json::to_value(chat),
            MessagePayload::Unknown { data, .. } => Ok(data.clone()),
        }
    }

    /// Build the typed variant for `message_type`.
    ///
    /// Callers must have validated `data` against the type's schema first.
    pub fn from_parts(message_type: &str, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match message_type {
            MESSAGE_TYPE_ATTESTATION => MessagePayload::Attestation(serde_json::from_value(data)?),
            MESSAGE_TYPE_DECRYPTION_SHARE => {
                MessagePayload::DecryptionShare(serde_json::from_value(data)?)
            }
            MESSAGE_TYPE_CHAT => MessagePayload::Chat(serde_json::from_value(data)?),
            other => MessagePayload::Unknown {
                message_type: other.to_string(),
                data,
            },
        })
    }
}

/// A decrypted, schema-validated message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaintextMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    /// The `data` value exactly as the sender serialized it
    pub data: Value,
    #[serde(skip)]
    pub payload: MessagePayload,
    pub to_public_key: PublicKey,
    pub from_public_key: PublicKey,
    pub from_display_name: String,
    pub timestamp: DateTime<Utc>,
}

impl PlaintextMessage {
    pub fn attestation(&self) -> Option<&TapAttestation> {
        match &self.payload {
            MessagePayload::Attestation(attestation) => Some(attestation),
            _ => None,
        }
    }
}
