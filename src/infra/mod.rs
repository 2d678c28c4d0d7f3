//! Infrastructure layer for tapquest
//!
//! Contains trait definitions and implementations for:
//! - Tap verification (signature check + nonce replay tracking)
//! - Envelope protocol (HPKE seal/open with schema validation)
//! - Attestation store (deduplicated, category-partitioned)
//! - JSON Schema validation of envelopes and payloads

mod attestation_store;
mod error;
mod nonce_store;
mod schema_validation;
mod signal;
mod tap_verifier;

pub use attestation_store::{
    AttestationStore, RecordOutcome, StoreError, StoreSnapshot, STORE_SNAPSHOT_VERSION,
};
pub use error::*;
#[cfg(test)]
pub use nonce_store::MockNonceStore;
pub use nonce_store::{
    InMemoryNonceStore, NonceStore, ReplayRejection, ReplayWindow, MAX_REPLAY_WINDOW,
};
pub use schema_validation::{PayloadSchemas, SchemaError, SchemaViolation};
pub use signal::{EnvelopeError, EnvelopeProtocol};
pub use tap_verifier::{TapParams, TapVerifier, VerificationError, VerificationFailure};
