//! Tap signature verification
//!
//! Turns the three hex strings an NFC tap URL carries into a verified
//! [`TapAttestation`]:
//!
//! 1. strip the hardware tag from `pkN`
//! 2. split `rnd` into nonce (first 8 hex chars) and randomness
//! 3. rebuild the counter message
//! 4. verify `rndsig` over it with the configured ECDSA scheme
//! 5. advance the signer's nonce high-water mark
//!
//! Nonce state only changes after the signature checks out, so a forged tap
//! cannot burn a genuine card's counter.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AttestConfig;
use crate::crypto::{
    decode_hex, key_fingerprint, parse_nonce_hex, CounterMessageCodec, SignatureScheme,
    TapVerifyingKey, NONCE_HEX_LEN,
};
use crate::domain::{PublicKey, SignerCategory, TapAttestation};
use crate::infra::nonce_store::{InMemoryNonceStore, NonceStore, ReplayRejection};

/// Raw tap parameters as received from the NFC/URL layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapParams {
    /// Tagged public key hex (`pk1`, `pk2`, ...)
    pub pk_n: Option<String>,
    /// Nonce hex followed by randomness hex
    pub rnd: Option<String>,
    /// Signature hex over the counter message
    pub rndsig: Option<String>,
}

impl TapParams {
    pub fn new(pk_n: impl Into<String>, rnd: impl Into<String>, rndsig: impl Into<String>) -> Self {
        Self {
            pk_n: Some(pk_n.into()),
            rnd: Some(rnd.into()),
            rndsig: Some(rndsig.into()),
        }
    }

    /// Parse a tap URL or its query string.
    ///
    /// Any `pk<digits>` key is taken as the public key; the first one wins.
    /// Empty values count as absent.
    pub fn from_query(input: &str) -> Self {
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None => input,
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut params = Self::default();
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let slot = match key {
                "rnd" => &mut params.rnd,
                "rndsig" => &mut params.rndsig,
                k if is_public_key_param(k) => &mut params.pk_n,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        params
    }
}

fn is_public_key_param(key: &str) -> bool {
    key.strip_prefix("pk")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Why a tap was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    MissingField(&'static str),
    MalformedHex(&'static str),
    SignatureInvalid,
    /// `rnd` is too short to carry a nonce
    NonceTooSmall,
    ReplayedNonce { nonce: u32, high_water: u32 },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field: {}", field),
            Self::MalformedHex(field) => write!(f, "malformed hex in {}", field),
            Self::SignatureInvalid => write!(f, "signature invalid"),
            Self::NonceTooSmall => write!(f, "rnd too short to contain a nonce"),
            Self::ReplayedNonce { nonce, high_water } => {
                write!(f, "replayed nonce {} (high water {})", nonce, high_water)
            }
        }
    }
}

/// Tap verification error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tap verification failed: {reason}")]
pub struct VerificationError {
    pub reason: VerificationFailure,
}

impl VerificationError {
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self.reason,
            VerificationFailure::SignatureInvalid | VerificationFailure::ReplayedNonce { .. }
        )
    }
}

impl From<VerificationFailure> for VerificationError {
    fn from(reason: VerificationFailure) -> Self {
        Self { reason }
    }
}

impl From<ReplayRejection> for VerificationError {
    fn from(r: ReplayRejection) -> Self {
        VerificationFailure::ReplayedNonce {
            nonce: r.nonce,
            high_water: r.high_water,
        }
        .into()
    }
}

/// Verifies taps for one session
pub struct TapVerifier {
    scheme: SignatureScheme,
    codec: CounterMessageCodec,
    public_key_tag_len: usize,
    nonces: Arc<dyn NonceStore>,
}

impl TapVerifier {
    /// Verifier with an in-memory nonce store sized from `config`
    pub fn new(config: &AttestConfig) -> Self {
        Self::with_nonce_store(
            config,
            Arc::new(InMemoryNonceStore::with_window(config.replay_window)),
        )
    }

    pub fn with_nonce_store(config: &AttestConfig, nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            scheme: config.signature_scheme,
            codec: CounterMessageCodec::new(config.counter_prefix.clone()),
            public_key_tag_len: config.public_key_tag_len,
            nonces,
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn codec(&self) -> &CounterMessageCodec {
        &self.codec
    }

    pub fn nonce_store(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Verify a tap and record its nonce
    pub fn verify(
        &self,
        params: &TapParams,
        category: SignerCategory,
    ) -> Result<TapAttestation, VerificationError> {
        let pk_hex = required(&params.pk_n, "pkN")?;
        let rnd = required(&params.rnd, "rnd")?;
        let rndsig = required(&params.rndsig, "rndsig")?;

        let key_bytes = pk_hex
            .get(self.public_key_tag_len..)
            .filter(|s| !s.is_empty())
            .and_then(|s| decode_hex(s).ok())
            .ok_or(VerificationFailure::MalformedHex("pkN"))?;

        if rnd.len() < NONCE_HEX_LEN {
            return Err(VerificationFailure::NonceTooSmall.into());
        }
        let nonce = rnd
            .get(..NONCE_HEX_LEN)
            .and_then(parse_nonce_hex)
            .ok_or(VerificationFailure::MalformedHex("rnd"))?;
        let counter_message = rnd
            .get(NONCE_HEX_LEN..)
            .and_then(|randomness| self.codec.message(nonce, randomness).ok())
            .ok_or(VerificationFailure::MalformedHex("rnd"))?;

        let signature =
            decode_hex(rndsig).map_err(|_| VerificationFailure::MalformedHex("rndsig"))?;

        let verifying_key = TapVerifyingKey::from_sec1_bytes(self.scheme, &key_bytes)
            .map_err(|_| VerificationFailure::MalformedHex("pkN"))?;

        let signer = PublicKey::from_bytes(key_bytes);
        let fingerprint = key_fingerprint(signer.as_bytes());

        // Pre-check only; the nonce is recorded after the signature verifies
        self.nonces.check(&signer, nonce).map_err(|r| {
            warn!(signer = %fingerprint, nonce, high_water = r.high_water, "replayed tap nonce");
            VerificationError::from(r)
        })?;

        if verifying_key
            .verify(&counter_message.to_bytes(), &signature)
            .is_err()
        {
            warn!(signer = %fingerprint, nonce, scheme = %self.scheme, "tap signature invalid");
            return Err(VerificationFailure::SignatureInvalid.into());
        }

        self.nonces.check_and_record(&signer, nonce).map_err(|r| {
            warn!(signer = %fingerprint, nonce, high_water = r.high_water, "replayed tap nonce");
            VerificationError::from(r)
        })?;

        debug!(signer = %fingerprint, nonce, category = %category, "tap verified");

        Ok(TapAttestation::new(
            signer,
            counter_message,
            signature,
            category,
        ))
    }

    /// Re-check a received attestation's signature. Nonce state is untouched.
    pub fn verify_signature_only(
        &self,
        attestation: &TapAttestation,
    ) -> Result<(), VerificationError> {
        if attestation.counter_message().prefix() != self.codec.prefix() {
            return Err(VerificationFailure::SignatureInvalid.into());
        }

        let verifying_key =
            TapVerifyingKey::from_sec1_bytes(self.scheme, attestation.signer_public_key().as_bytes())
                .map_err(|_| VerificationFailure::MalformedHex("signerPublicKey"))?;

        verifying_key
            .verify(
                &attestation.counter_message().to_bytes(),
                attestation.signature(),
            )
            .map_err(|_| VerificationFailure::SignatureInvalid.into())
    }
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, VerificationError> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VerificationFailure::MissingField(field).into())
}

// ============================================================================
// Tests
// ============================================================================
