//! tapquest library
//!
//! Proof-of-presence from NFC taps: a chip signs a counter message, the
//! phone verifies the signature and the nonce, and verified attestations are
//! exchanged between participants inside HPKE-encrypted envelopes. Quests
//! are scored from the set of signers a participant has collected.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (signer keys, attestations, envelopes, quests)
//! - [`crypto`] - Counter message codec, tap signatures, envelope encryption
//! - [`infra`] - Tap verifier, nonce store, envelope protocol, attestation store
//! - [`quest`] - Requirement engine
//! - [`session`] - Per-device context tying the pipeline together
//! - [`config`] - Environment-driven configuration
//! - [`telemetry`] - Structured logging setup

pub mod config;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod quest;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AttestConfig, ConfigError};
pub use domain::{
    CounterMessage, EncryptedEnvelope, MessagePayload, PlaintextMessage, PublicKey, Quest,
    SignerCategory, TapAttestation,
};
pub use infra::{
    AttestError, AttestationStore, EnvelopeProtocol, NonceStore, RecordOutcome, Result,
    TapParams, TapVerifier,
};
pub use session::{IngestOutcome, Session, SessionKeys};
