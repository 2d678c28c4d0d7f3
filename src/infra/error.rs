//! Error types for the tapquest attestation pipeline

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::EncodingError;
use crate::infra::{EnvelopeError, StoreError, VerificationError};

/// Errors that can occur anywhere in the attestation pipeline.
///
/// Every component returns its own typed error; this enum lets callers that
/// drive several components propagate with `?` and still match on the kind.
#[derive(Error, Debug)]
pub enum AttestError {
    /// Malformed hex or byte lengths in a counter message
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Bad, forged or replayed tap
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Envelope schema, encryption or decryption failure
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Attestation store snapshot failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AttestError {
    /// Whether this failure may indicate tampering or a wrong-key bug
    pub fn is_security_relevant(&self) -> bool {
        match self {
            AttestError::Verification(e) => e.is_security_relevant(),
            AttestError::Envelope(e) => e.is_decryption_failure(),
            AttestError::Store(StoreError::Unseal(_)) => true,
            _ => false,
        }
    }
}

/// Result type for tapquest operations
pub type Result<T> = std::result::Result<T, AttestError>;
