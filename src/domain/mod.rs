//! Domain models for tapquest
//!
//! Signer identities, tap attestations, encrypted envelopes and quest
//! requirement definitions.

mod attestation;
mod message;
mod quest;
mod types;

pub use attestation::*;
pub use message::*;
pub use quest::*;
pub use types::*;
