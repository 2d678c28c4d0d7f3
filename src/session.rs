//! Session context
//!
//! A [`Session`] owns everything one device needs for the attestation
//! pipeline: configuration, its envelope key pair, the tap verifier with
//! its nonce state, and the attestation store. Nothing is process-global;
//! two sessions in one process share no state.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, Instrument};

use crate::config::AttestConfig;
use crate::crypto::{
    derive_envelope_public_key, envelope_key_from_slice, generate_envelope_keypair,
    key_fingerprint, EncryptionError, EnvelopePublicKey, EnvelopeSecretKey,
};
use crate::domain::{
    EncryptedEnvelope, MessagePayload, PlaintextMessage, PublicKey, Quest, SignerCategory,
    TapAttestation,
};
use crate::infra::{
    AttestError, AttestationStore, EnvelopeError, EnvelopeProtocol, NonceStore, RecordOutcome,
    Result, TapParams, TapVerifier,
};
use crate::quest::{compute_num_requirements_satisfied, quest_progress, QuestProgress};
use crate::telemetry::spans;

/// The session's envelope identity
#[derive(Clone)]
pub struct SessionKeys {
    secret_key: EnvelopeSecretKey,
    public_key: EnvelopePublicKey,
    display_name: String,
}

impl SessionKeys {
    pub fn generate(display_name: impl Into<String>) -> Self {
        let (secret_key, public_key) = generate_envelope_keypair();
        Self {
            secret_key,
            public_key,
            display_name: display_name.into(),
        }
    }

    pub fn from_secret_key(
        secret_key: EnvelopeSecretKey,
        display_name: impl Into<String>,
    ) -> std::result::Result<Self, EncryptionError> {
        Ok(Self {
            public_key: derive_envelope_public_key(&secret_key)?,
            secret_key,
            display_name: display_name.into(),
        })
    }

    pub fn secret_key(&self) -> &EnvelopeSecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.public_key)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("public_key", &hex::encode(self.public_key))
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Result of ingesting one envelope
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub message: PlaintextMessage,
    /// Set when the message carried an attestation
    pub recorded: Option<RecordOutcome>,
}

pub struct Session {
    config: AttestConfig,
    keys: SessionKeys,
    verifier: TapVerifier,
    protocol: EnvelopeProtocol,
    store: AttestationStore,
}

impl Session {
    pub fn new(config: AttestConfig, keys: SessionKeys) -> Result<Self> {
        config.validate()?;
        let verifier = TapVerifier::new(&config);
        Self::build(config, keys, verifier)
    }

    /// Session backed by an external nonce store
    pub fn with_nonce_store(
        config: AttestConfig,
        keys: SessionKeys,
        nonces: Arc<dyn NonceStore>,
    ) -> Result<Self> {
        config.validate()?;
        let verifier = TapVerifier::with_nonce_store(&config, nonces);
        Self::build(config, keys, verifier)
    }

    fn build(config: AttestConfig, keys: SessionKeys, verifier: TapVerifier) -> Result<Self> {
        let protocol = EnvelopeProtocol::new(&config)?;
        info!(
            public_key = %key_fingerprint(&keys.public_key),
            scheme = %config.signature_scheme,
            replay_window = config.replay_window,
            "session started"
        );
        Ok(Self {
            config,
            keys,
            verifier,
            protocol,
            store: AttestationStore::new(),
        })
    }

    pub fn config(&self) -> &AttestConfig {
        &self.config
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn verifier(&self) -> &TapVerifier {
        &self.verifier
    }

    pub fn protocol(&self) -> &EnvelopeProtocol {
        &self.protocol
    }

    pub fn store(&self) -> &AttestationStore {
        &self.store
    }

    /// Verify a tap and keep a copy of the attestation
    pub fn tap(&self, params: &TapParams, category: SignerCategory) -> Result<TapAttestation> {
        let _span = info_span!(spans::VERIFY_TAP, category = %category).entered();
        let attestation = self.verifier.verify(params, category)?;
        self.store.record(attestation.clone());
        Ok(attestation)
    }

    /// Encrypt a payload for `recipient`
    pub fn seal_message(
        &self,
        payload: &MessagePayload,
        recipient: &PublicKey,
    ) -> Result<EncryptedEnvelope> {
        let _span = info_span!(spans::SEAL_ENVELOPE, message_type = payload.message_type()).entered();
        let recipient_pk =
            envelope_key_from_slice(recipient.as_bytes()).map_err(EnvelopeError::from)?;
        Ok(self.protocol.seal_envelope(
            payload,
            &self.keys.secret_key,
            &self.keys.display_name,
            &recipient_pk,
            Utc::now(),
        )?)
    }

    pub fn share_attestation(
        &self,
        attestation: &TapAttestation,
        recipient: &PublicKey,
    ) -> Result<EncryptedEnvelope> {
        self.seal_message(&MessagePayload::Attestation(attestation.clone()), recipient)
    }

    /// Decrypt an envelope addressed to this session
    pub fn open(&self, envelope: &EncryptedEnvelope) -> Result<PlaintextMessage> {
        let _span = info_span!(spans::OPEN_ENVELOPE).entered();
        Ok(self.protocol.decrypt(envelope, &self.keys.secret_key)?)
    }

    /// Decrypt and re-verify; nothing is recorded
    fn open_checked(&self, envelope: &EncryptedEnvelope) -> Result<PlaintextMessage> {
        let message = self.open(envelope)?;
        if let Some(attestation) = message.attestation() {
            self.verifier.verify_signature_only(attestation)?;
        }
        Ok(message)
    }

    fn record_message(&self, message: PlaintextMessage) -> IngestOutcome {
        let recorded = message
            .attestation()
            .map(|attestation| self.store.record(attestation.clone()));
        IngestOutcome { message, recorded }
    }

    /// Decrypt an envelope and record any attestation it carries.
    ///
    /// Received attestations are re-verified before they are recorded; the
    /// sender's nonce state is not consulted.
    pub fn ingest(&self, envelope: &EncryptedEnvelope) -> Result<IngestOutcome> {
        let message = self.open_checked(envelope)?;
        Ok(self.record_message(message))
    }

    /// Ingest many envelopes.
    ///
    /// Decryption runs on blocking worker threads; successful messages are
    /// then recorded in timestamp order. Results come back in input order.
    pub async fn ingest_batch(
        self: &Arc<Self>,
        envelopes: Vec<EncryptedEnvelope>,
    ) -> Vec<Result<IngestOutcome>> {
        let span = info_span!(spans::INGEST_BATCH, count = envelopes.len());
        async move {
            let tasks: Vec<_> = envelopes
                .into_iter()
                .map(|envelope| {
                    let session = Arc::clone(self);
                    tokio::task::spawn_blocking(move || session.open_checked(&envelope))
                })
                .collect();

            let mut opened = Vec::with_capacity(tasks.len());
            for (index, task) in tasks.into_iter().enumerate() {
                let result = task.await.unwrap_or_else(|e| {
                    Err(AttestError::Internal(format!("decrypt task failed: {}", e)))
                });
                opened.push((index, result));
            }

            opened.sort_by_key(|(index, result)| {
                (result.as_ref().ok().map(|m| m.timestamp), *index)
            });

            let mut results: Vec<_> = opened
                .into_iter()
                .map(|(index, result)| (index, result.map(|m| self.record_message(m))))
                .collect();
            results.sort_by_key(|(index, _)| *index);

            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            info!(total = results.len(), failed, "batch ingested");

            results.into_iter().map(|(_, r)| r).collect()
        }
        .instrument(span)
        .await
    }

    pub fn known_signer_keys(&self, category: SignerCategory) -> BTreeSet<PublicKey> {
        self.store.list_signer_keys(category)
    }

    pub fn num_requirements_satisfied(&self, quest: &Quest) -> usize {
        compute_num_requirements_satisfied(
            &self.known_signer_keys(SignerCategory::Person),
            &self.known_signer_keys(SignerCategory::Location),
            &quest.user_requirements,
            &quest.location_requirements,
        )
    }

    pub fn quest_progress(&self, quest: &Quest) -> QuestProgress {
        quest_progress(
            &self.known_signer_keys(SignerCategory::Person),
            &self.known_signer_keys(SignerCategory::Location),
            quest,
        )
    }

    /// Wipe attestations and nonce state (logout / account deletion)
    pub fn clear_local_data(&self) {
        self.store.clear();
        self.verifier.nonce_store().clear();
        info!("local session data cleared");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CounterMessageCodec, SignatureScheme, TapSigningKey};
    use crate::domain::ChatMessage;

    fn session(name: &str) -> Session {
        Session::new(AttestConfig::default(), SessionKeys::generate(name)).unwrap()
    }

    fn tap(card: &TapSigningKey, nonce: u32) -> TapParams {
        let msg = CounterMessageCodec::default().build(nonce, "0a0b").unwrap();
        TapParams::new(
            format!("04c1{}", hex::encode(card.public_key_bytes())),
            format!("{:08x}0a0b", nonce),
            hex::encode(card.sign(&msg)),
        )
    }

    #[test]
    fn test_tap_records_locally() {
        let alice = session("alice");
        let card = TapSigningKey::generate(SignatureScheme::EcdsaSecp256k1);

        alice.tap(&tap(&card, 1), SignerCategory::Location).unwrap();
        assert_eq!(alice.store().len(SignerCategory::Location), 1);
    }

    #[test]
    fn test_share_and_ingest() {
        let alice = session("alice");
        let bob = session("bob");
        let card = TapSigningKey::generate(SignatureScheme::EcdsaSecp256k1);

        let attestation = alice.tap(&tap(&card, 3), SignerCategory::Person).unwrap();
        let envelope = alice
            .share_attestation(&attestation, &bob.keys().public_key())
            .unwrap();

        let outcome = bob.ingest(&envelope).unwrap();
        assert_eq!(outcome.recorded, Some(RecordOutcome::Inserted));
        assert_eq!(outcome.message.from_display_name, "alice");
        assert_eq!(
            bob.get_known(&attestation),
            Some(attestation.clone()),
        );

        // Re-delivery is idempotent
        let again = bob.ingest(&envelope).unwrap();
        assert_eq!(again.recorded, Some(RecordOutcome::Ignored { existing_nonce: 3 }));
    }

    #[test]
    fn test_chat_is_not_recorded() {
        let alice = session("alice");
        let bob = session("bob");

        let envelope = alice
            .seal_message(
                &MessagePayload::Chat(ChatMessage {
                    text: "see you at booth 4".to_string(),
                }),
                &bob.keys().public_key(),
            )
            .unwrap();

        let outcome = bob.ingest(&envelope).unwrap();
        assert!(outcome.recorded.is_none());
        assert!(bob.store().is_empty());
    }

    #[test]
    fn test_bad_recipient_key_length() {
        let alice = session("alice");
        let err = alice
            .seal_message(
                &MessagePayload::Chat(ChatMessage { text: "x".into() }),
                &PublicKey::from_bytes(vec![1, 2, 3]),
            )
            .unwrap_err();
        assert!(matches!(err, AttestError::Envelope(EnvelopeError::Encryption(_))));
    }

    #[test]
    fn test_clear_local_data() {
        let alice = session("alice");
        let card = TapSigningKey::generate(SignatureScheme::EcdsaSecp256k1);

        alice.tap(&tap(&card, 5), SignerCategory::Person).unwrap();
        alice.clear_local_data();
        assert!(alice.store().is_empty());

        // Nonce state is gone too, so an older nonce is accepted again
        assert!(alice.tap(&tap(&card, 2), SignerCategory::Person).is_ok());
    }

    #[test]
    fn test_keys_from_secret() {
        let keys = SessionKeys::generate("carol");
        let restored = SessionKeys::from_secret_key(*keys.secret_key(), "carol").unwrap();
        assert_eq!(restored.public_key(), keys.public_key());
        assert!(!format!("{:?}", keys).contains(&hex::encode(keys.secret_key())));
    }

    impl Session {
        fn get_known(&self, attestation: &TapAttestation) -> Option<TapAttestation> {
            self.store
                .get(attestation.category(), attestation.signer_public_key())
        }
    }
}
