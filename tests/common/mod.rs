//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use tapquest::config::AttestConfig;
use tapquest::crypto::{CounterMessageCodec, SignatureScheme, TapSigningKey};
use tapquest::domain::{
    LocationRequirement, PublicKey, Quest, RequirementLocation, RequirementUser, UserRequirement,
};
use tapquest::infra::TapParams;
use tapquest::session::{Session, SessionKeys};

/// Hardware tag the test cards put in front of their key
pub const TEST_TAG: &str = "04c1";

/// Randomness the test cards append after the nonce
pub const TEST_RANDOMNESS: &str = "deadbeef";

/// A simulated NFC card
pub struct TestCard {
    pub key: TapSigningKey,
    codec: CounterMessageCodec,
}

impl TestCard {
    pub fn new(scheme: SignatureScheme) -> Self {
        Self {
            key: TapSigningKey::generate(scheme),
            codec: CounterMessageCodec::default(),
        }
    }

    pub fn secp256k1() -> Self {
        Self::new(SignatureScheme::EcdsaSecp256k1)
    }

    /// Signer identity as it ends up in the attestation store
    pub fn signer_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.key.public_key_bytes())
    }

    /// Tap parameters for counter value `nonce`
    pub fn tap(&self, nonce: u32) -> TapParams {
        let message = self.codec.build(nonce, TEST_RANDOMNESS).unwrap();
        TapParams::new(
            format!("{}{}", TEST_TAG, hex::encode(self.key.public_key_bytes())),
            format!("{:08x}{}", nonce, TEST_RANDOMNESS),
            hex::encode(self.key.sign(&message)),
        )
    }

    /// Tap URL as the card would emit it
    pub fn tap_url(&self, nonce: u32) -> String {
        let params = self.tap(nonce);
        format!(
            "https://tap.example/t?pk1={}&rnd={}&rndsig={}",
            params.pk_n.unwrap(),
            params.rnd.unwrap(),
            params.rndsig.unwrap()
        )
    }
}

pub fn session(name: &str) -> Session {
    Session::new(AttestConfig::default(), SessionKeys::generate(name)).unwrap()
}

pub fn shared_session(name: &str) -> Arc<Session> {
    Arc::new(session(name))
}

pub fn user_requirement(name: &str, required: u32, cards: &[&TestCard]) -> UserRequirement {
    UserRequirement {
        name: name.to_string(),
        num_sigs_required: required,
        users: cards
            .iter()
            .enumerate()
            .map(|(i, card)| RequirementUser {
                display_name: format!("user-{}", i),
                signature_public_key: card.signer_key(),
            })
            .collect(),
    }
}

pub fn location_requirement(name: &str, required: u32, cards: &[&TestCard]) -> LocationRequirement {
    LocationRequirement {
        name: name.to_string(),
        num_sigs_required: required,
        locations: cards
            .iter()
            .enumerate()
            .map(|(i, card)| RequirementLocation {
                name: format!("booth-{}", i),
                signature_public_key: card.signer_key(),
            })
            .collect(),
    }
}

pub fn quest(
    user_requirements: Vec<UserRequirement>,
    location_requirements: Vec<LocationRequirement>,
) -> Quest {
    Quest {
        id: 1,
        name: "Conference hunt".to_string(),
        user_requirements,
        location_requirements,
    }
}
