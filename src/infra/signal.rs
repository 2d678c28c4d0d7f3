//! jubSignal envelope protocol
//!
//! Moves typed payloads between two X25519 keys:
//!
//! ```text
//! encrypt:  {type, data} -> schema check -> JSON bytes -> size bound -> HPKE Auth seal
//! decrypt:  envelope schema -> recipient key check -> HPKE Auth open -> payload schema
//!           -> typed data schema
//! ```
//!
//! Decrypt is the only place a payload's shape is trusted. Both public keys
//! are bound through the HPKE `info`, and `to_public_key` must also match the
//! key derived from the recipient secret. The display name and timestamp are
//! copied verbatim and are not authenticated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AttestConfig;
use crate::crypto::{
    derive_envelope_public_key, envelope_key_from_slice, key_fingerprint, open_contents,
    seal_contents, EncryptionError, EnvelopePublicKey, EnvelopeSecretKey,
};
use crate::domain::{EncryptedEnvelope, MessagePayload, PlaintextMessage, PublicKey};
use crate::infra::schema_validation::{PayloadSchemas, SchemaError};

/// Errors from the envelope protocol
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Authentication failed: tampered contents, wrong key or wrong sender
    #[error("envelope decryption failed (from {from_public_key})")]
    DecryptionFailed { from_public_key: PublicKey },

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnvelopeError {
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, EnvelopeError::DecryptionFailed { .. })
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(self, EnvelopeError::Schema(_))
    }
}

/// Encrypts and decrypts envelopes with a fixed size bound and schema set
#[derive(Debug, Clone)]
pub struct EnvelopeProtocol {
    max_payload_bytes: usize,
    schemas: Arc<PayloadSchemas>,
}

impl EnvelopeProtocol {
    pub fn new(config: &AttestConfig) -> Result<Self, EnvelopeError> {
        Ok(Self {
            max_payload_bytes: config.max_payload_bytes,
            schemas: Arc::new(PayloadSchemas::new()?),
        })
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn schemas(&self) -> &PayloadSchemas {
        &self.schemas
    }

    /// Encrypt `{type, data}` for `recipient_public_key`.
    ///
    /// Returns the `encryptedContents` string.
    pub fn encrypt(
        &self,
        message_type: &str,
        data: &Value,
        sender_secret_key: &EnvelopeSecretKey,
        recipient_public_key: &EnvelopePublicKey,
    ) -> Result<String, EnvelopeError> {
        let payload = json!({ "type": message_type, "data": data });
        self.schemas.validate_payload(&payload)?;
        self.schemas.validate_data(message_type, data)?;

        // Not JCS: numbers must decrypt unchanged
        let plaintext = serde_json::to_vec(&payload)?;
        if plaintext.len() > self.max_payload_bytes {
            return Err(EnvelopeError::PayloadTooLarge {
                size: plaintext.len(),
                max: self.max_payload_bytes,
            });
        }

        Ok(seal_contents(
            &plaintext,
            sender_secret_key,
            recipient_public_key,
        )?)
    }

    /// Encrypt a typed payload
    pub fn encrypt_payload(
        &self,
        payload: &MessagePayload,
        sender_secret_key: &EnvelopeSecretKey,
        recipient_public_key: &EnvelopePublicKey,
    ) -> Result<String, EnvelopeError> {
        self.encrypt(
            payload.message_type(),
            &payload.to_data()?,
            sender_secret_key,
            recipient_public_key,
        )
    }

    /// Encrypt a typed payload and wrap it in a full envelope
    pub fn seal_envelope(
        &self,
        payload: &MessagePayload,
        sender_secret_key: &EnvelopeSecretKey,
        from_display_name: &str,
        recipient_public_key: &EnvelopePublicKey,
        timestamp: DateTime<Utc>,
    ) -> Result<EncryptedEnvelope, EnvelopeError> {
        let encrypted_contents =
            self.encrypt_payload(payload, sender_secret_key, recipient_public_key)?;
        let from_public_key = derive_envelope_public_key(sender_secret_key)?;

        Ok(EncryptedEnvelope {
            to_public_key: PublicKey::from(*recipient_public_key),
            from_public_key: PublicKey::from(from_public_key),
            from_display_name: from_display_name.to_string(),
            encrypted_contents,
            timestamp,
        })
    }

    /// Validate raw envelope JSON and convert it to the typed record
    pub fn parse_envelope(&self, value: &Value) -> Result<EncryptedEnvelope, EnvelopeError> {
        self.schemas.validate_envelope(value)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            SchemaError::violation("envelope", "", format!("invalid envelope: {}", e)).into()
        })
    }

    /// Decrypt raw envelope JSON
    pub fn decrypt_value(
        &self,
        envelope: &Value,
        recipient_secret_key: &EnvelopeSecretKey,
    ) -> Result<PlaintextMessage, EnvelopeError> {
        let envelope = self.parse_envelope(envelope)?;
        self.open_validated(&envelope, recipient_secret_key)
    }

    /// Decrypt an envelope addressed to `recipient_secret_key`
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        recipient_secret_key: &EnvelopeSecretKey,
    ) -> Result<PlaintextMessage, EnvelopeError> {
        self.schemas
            .validate_envelope(&serde_json::to_value(envelope)?)?;
        self.open_validated(envelope, recipient_secret_key)
    }

    fn open_validated(
        &self,
        envelope: &EncryptedEnvelope,
        recipient_secret_key: &EnvelopeSecretKey,
    ) -> Result<PlaintextMessage, EnvelopeError> {
        let sender_fp = key_fingerprint(envelope.from_public_key.as_bytes());

        let recipient_pk = derive_envelope_public_key(recipient_secret_key)?;
        if envelope.to_public_key.as_bytes() != recipient_pk.as_slice() {
            warn!(
                from = %sender_fp,
                to = %key_fingerprint(envelope.to_public_key.as_bytes()),
                recipient = %key_fingerprint(&recipient_pk),
                "envelope addressed to a different key"
            );
            return Err(EnvelopeError::DecryptionFailed {
                from_public_key: envelope.from_public_key.clone(),
            });
        }

        let plaintext = envelope_key_from_slice(envelope.from_public_key.as_bytes())
            .and_then(|sender_pk| {
                open_contents(
                    &envelope.encrypted_contents,
                    recipient_secret_key,
                    &sender_pk,
                )
            })
            .map_err(|e| {
                warn!(
                    from = %sender_fp,
                    from_display_name = %envelope.from_display_name,
                    error = %e,
                    "envelope decryption failed"
                );
                EnvelopeError::DecryptionFailed {
                    from_public_key: envelope.from_public_key.clone(),
                }
            })?;

        let payload: Value = serde_json::from_slice(&plaintext).map_err(|e| {
            SchemaError::violation("payload", "", format!("payload is not JSON: {}", e))
        })?;
        self.schemas.validate_payload(&payload)?;

        let (message_type, data) = match payload {
            Value::Object(mut map) => {
                let message_type = match map.remove("type") {
                    Some(Value::String(t)) => t,
                    _ => return Err(SchemaError::missing("payload", vec!["type".into()]).into()),
                };
                let data = map.remove("data").unwrap_or(Value::Null);
                (message_type, data)
            }
            _ => return Err(SchemaError::violation("payload", "", "payload is not an object").into()),
        };

        self.schemas.validate_data(&message_type, &data)?;
        let typed = MessagePayload::from_parts(&message_type, data.clone()).map_err(|e| {
            SchemaError::violation(message_type.clone(), "", e.to_string())
        })?;

        debug!(from = %sender_fp, message_type = %message_type, "envelope decrypted");

        Ok(PlaintextMessage {
            message_type,
            data,
            payload: typed,
            to_public_key: envelope.to_public_key.clone(),
            from_public_key: envelope.from_public_key.clone(),
            from_display_name: envelope.from_display_name.clone(),
            timestamp: envelope.timestamp,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{base64_url_decode, base64_url_encode, generate_envelope_keypair};
    use crate::domain::{ChatMessage, DecryptionShare};

    fn protocol() -> EnvelopeProtocol {
        EnvelopeProtocol::new(&AttestConfig::default()).unwrap()
    }

    fn envelope_for(
        protocol: &EnvelopeProtocol,
        payload: &MessagePayload,
    ) -> (EncryptedEnvelope, EnvelopeSecretKey) {
        let (alice_sk, _) = generate_envelope_keypair();
        let (bob_sk, bob_pk) = generate_envelope_keypair();
        let envelope = protocol
            .seal_envelope(payload, &alice_sk, "alice", &bob_pk, Utc::now())
            .unwrap();
        (envelope, bob_sk)
    }

    #[test]
    fn test_chat_roundtrip() {
        let p = protocol();
        let payload = MessagePayload::Chat(ChatMessage {
            text: "gm".to_string(),
        });
        let (envelope, bob_sk) = envelope_for(&p, &payload);

        let message = p.decrypt(&envelope, &bob_sk).unwrap();
        assert_eq!(message.message_type, "chat");
        assert_eq!(message.data, json!({ "text": "gm" }));
        assert_eq!(message.payload, payload);
        assert_eq!(message.from_display_name, "alice");
        assert_eq!(message.from_public_key, envelope.from_public_key);
        assert_eq!(message.to_public_key, envelope.to_public_key);
        assert_eq!(message.timestamp, envelope.timestamp);
    }

    #[test]
    fn test_unknown_type_roundtrip() {
        let p = protocol();
        let (alice_sk, alice_pk) = generate_envelope_keypair();
        let (bob_sk, bob_pk) = generate_envelope_keypair();

        let data = json!({ "round": 2, "points": ["aa", "bb"] });
        let contents = p.encrypt("psi-round2", &data, &alice_sk, &bob_pk).unwrap();

        let envelope = EncryptedEnvelope {
            to_public_key: PublicKey::from(bob_pk),
            from_public_key: PublicKey::from(alice_pk),
            from_display_name: "alice".to_string(),
            encrypted_contents: contents,
            timestamp: Utc::now(),
        };
        let message = p.decrypt(&envelope, &bob_sk).unwrap();
        assert_eq!(message.message_type, "psi-round2");
        assert_eq!(message.data, data);
        assert!(matches!(message.payload, MessagePayload::Unknown { .. }));
    }

    #[test]
    fn test_decryption_share_schema_enforced_on_encrypt() {
        let p = protocol();
        let (alice_sk, _) = generate_envelope_keypair();
        let (_, bob_pk) = generate_envelope_keypair();

        let err = p
            .encrypt("decryption-share", &json!({}), &alice_sk, &bob_pk)
            .unwrap_err();
        match err {
            EnvelopeError::Schema(e) => assert_eq!(e.missing_fields, vec!["messageRound3"]),
            other => panic!("unexpected error: {other}"),
        }

        let share = MessagePayload::DecryptionShare(DecryptionShare {
            message_round3: "c0ffee".to_string(),
        });
        assert!(p.encrypt_payload(&share, &alice_sk, &bob_pk).is_ok());
    }

    #[test]
    fn test_empty_type_rejected() {
        let p = protocol();
        let (alice_sk, _) = generate_envelope_keypair();
        let (_, bob_pk) = generate_envelope_keypair();
        assert!(p
            .encrypt("", &json!({}), &alice_sk, &bob_pk)
            .unwrap_err()
            .is_schema_error());
    }

    #[test]
    fn test_size_bound() {
        let config = AttestConfig {
            max_payload_bytes: 64,
            ..AttestConfig::default()
        };
        let p = EnvelopeProtocol::new(&config).unwrap();
        let (alice_sk, _) = generate_envelope_keypair();
        let (_, bob_pk) = generate_envelope_keypair();

        let big = json!({ "text": "x".repeat(100) });
        assert!(matches!(
            p.encrypt("chat", &big, &alice_sk, &bob_pk),
            Err(EnvelopeError::PayloadTooLarge { max: 64, .. })
        ));
        assert!(p.encrypt("chat", &json!({ "text": "ok" }), &alice_sk, &bob_pk).is_ok());
    }

    #[test]
    fn test_tampered_contents_fail_decryption() {
        let p = protocol();
        let payload = MessagePayload::Chat(ChatMessage {
            text: "hello".to_string(),
        });
        let (mut envelope, bob_sk) = envelope_for(&p, &payload);

        let mut blob = base64_url_decode(&envelope.encrypted_contents).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        envelope.encrypted_contents = base64_url_encode(&blob);

        let err = p.decrypt(&envelope, &bob_sk).unwrap_err();
        assert!(err.is_decryption_failure());
    }

    #[test]
    fn test_wrong_sender_key_fails_decryption() {
        let p = protocol();
        let payload = MessagePayload::Chat(ChatMessage {
            text: "hello".to_string(),
        });
        let (mut envelope, bob_sk) = envelope_for(&p, &payload);
        let (_, mallory_pk) = generate_envelope_keypair();
        envelope.from_public_key = PublicKey::from(mallory_pk);

        match p.decrypt(&envelope, &bob_sk).unwrap_err() {
            EnvelopeError::DecryptionFailed { from_public_key } => {
                assert_eq!(from_public_key, PublicKey::from(mallory_pk))
            }
            other => panic!("unexpected error: {other}"),
        }

        // A sender key of the wrong length is also an authentication failure
        envelope.from_public_key = PublicKey::from_bytes(vec![1, 2, 3]);
        assert!(p.decrypt(&envelope, &bob_sk).unwrap_err().is_decryption_failure());
    }

    #[test]
    fn test_decrypt_value_reports_missing_fields() {
        let p = protocol();
        let (bob_sk, _) = generate_envelope_keypair();

        let err = p
            .decrypt_value(&json!({ "toPublicKey": "aa", "encryptedContents": "x" }), &bob_sk)
            .unwrap_err();
        match err {
            EnvelopeError::Schema(e) => {
                let mut missing = e.missing_fields;
                missing.sort();
                assert_eq!(missing, vec!["fromDisplayName", "fromPublicKey", "timestamp"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decrypt_value_roundtrip() {
        let p = protocol();
        let payload = MessagePayload::Chat(ChatMessage {
            text: "via json".to_string(),
        });
        let (envelope, bob_sk) = envelope_for(&p, &payload);

        let wire = serde_json::to_value(&envelope).unwrap();
        let message = p.decrypt_value(&wire, &bob_sk).unwrap();
        assert_eq!(message.payload, payload);
    }

    #[test]
    fn test_bad_timestamp_is_schema_error() {
        let p = protocol();
        let (bob_sk, bob_pk) = generate_envelope_keypair();
        let wire = json!({
            "toPublicKey": hex::encode(bob_pk),
            "fromPublicKey": hex::encode(bob_pk),
            "fromDisplayName": "bob",
            "encryptedContents": "AAAA",
            "timestamp": "yesterday"
        });
        assert!(p.decrypt_value(&wire, &bob_sk).unwrap_err().is_schema_error());
    }

    #[test]
    fn test_non_json_plaintext_is_schema_error() {
        let p = protocol();
        let (alice_sk, alice_pk) = generate_envelope_keypair();
        let (bob_sk, bob_pk) = generate_envelope_keypair();

        let envelope = EncryptedEnvelope {
            to_public_key: PublicKey::from(bob_pk),
            from_public_key: PublicKey::from(alice_pk),
            from_display_name: "alice".to_string(),
            encrypted_contents: seal_contents(b"not json", &alice_sk, &bob_pk).unwrap(),
            timestamp: Utc::now(),
        };
        assert!(p.decrypt(&envelope, &bob_sk).unwrap_err().is_schema_error());

        // Authentic but missing `data`
        let envelope = EncryptedEnvelope {
            encrypted_contents: seal_contents(br#"{"type":"chat"}"#, &alice_sk, &bob_pk).unwrap(),
            ..envelope
        };
        match p.decrypt(&envelope, &bob_sk).unwrap_err() {
            EnvelopeError::Schema(e) => assert_eq!(e.missing_fields, vec!["data"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numbers_survive_roundtrip() {
        let p = protocol();
        let (alice_sk, alice_pk) = generate_envelope_keypair();
        let (bob_sk, bob_pk) = generate_envelope_keypair();

        for data in [
            json!({ "id": 9007199254740993u64 }),
            json!({ "id": u64::MAX }),
            json!({ "id": i64::MIN }),
            json!({ "x": 1.0 }),
            json!({ "x": 0.1, "y": -2.5e-300 }),
        ] {
            let envelope = EncryptedEnvelope {
                to_public_key: PublicKey::from(bob_pk),
                from_public_key: PublicKey::from(alice_pk),
                from_display_name: "alice".to_string(),
                encrypted_contents: p.encrypt("custom", &data, &alice_sk, &bob_pk).unwrap(),
                timestamp: Utc::now(),
            };
            let message = p.decrypt(&envelope, &bob_sk).unwrap();
            assert_eq!(message.data, data);
        }
    }

    #[test]
    fn test_misaddressed_envelope_fails_decryption() {
        let p = protocol();
        let payload = MessagePayload::Chat(ChatMessage {
            text: "hello".to_string(),
        });
        let (mut envelope, bob_sk) = envelope_for(&p, &payload);
        let (_, carol_pk) = generate_envelope_keypair();
        let from = envelope.from_public_key.clone();
        envelope.to_public_key = PublicKey::from(carol_pk);

        match p.decrypt(&envelope, &bob_sk).unwrap_err() {
            EnvelopeError::DecryptionFailed { from_public_key } => {
                assert_eq!(from_public_key, from)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
