//! Batch ingestion tests
//!
//! Envelopes are decrypted on blocking workers and recorded in timestamp
//! order, so delivery order never changes which attestation wins.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use tapquest::domain::{EncryptedEnvelope, MessagePayload, SignerCategory};
use tapquest::infra::{AttestError, EnvelopeError, RecordOutcome};

use common::*;

#[tokio::test]
async fn test_batch_results_in_input_order() {
    let alice = session("alice");
    let bob = shared_session("bob");
    let cards: Vec<TestCard> = (0..5).map(|_| TestCard::secp256k1()).collect();

    let envelopes: Vec<EncryptedEnvelope> = cards
        .iter()
        .map(|card| {
            let attestation = alice.tap(&card.tap(1), SignerCategory::Person).unwrap();
            alice
                .share_attestation(&attestation, &bob.keys().public_key())
                .unwrap()
        })
        .collect();

    let results = bob.ingest_batch(envelopes).await;
    assert_eq!(results.len(), 5);
    for result in &results {
        assert_eq!(
            result.as_ref().unwrap().recorded,
            Some(RecordOutcome::Inserted)
        );
    }
    assert_eq!(bob.store().len(SignerCategory::Person), 5);
}

#[tokio::test]
async fn test_batch_records_in_timestamp_order() {
    let alice = session("alice");
    let bob = shared_session("bob");
    let card = TestCard::secp256k1();

    let old = alice.tap(&card.tap(3), SignerCategory::Location).unwrap();
    let new = alice.tap(&card.tap(8), SignerCategory::Location).unwrap();

    let mut old_envelope = alice
        .share_attestation(&old, &bob.keys().public_key())
        .unwrap();
    let mut new_envelope = alice
        .share_attestation(&new, &bob.keys().public_key())
        .unwrap();
    let now = Utc::now();
    old_envelope.timestamp = now - Duration::minutes(5);
    new_envelope.timestamp = now;

    // Newest delivered first
    let results = bob.ingest_batch(vec![new_envelope, old_envelope]).await;

    assert_eq!(
        results[1].as_ref().unwrap().recorded,
        Some(RecordOutcome::Inserted)
    );
    assert_eq!(
        results[0].as_ref().unwrap().recorded,
        Some(RecordOutcome::Replaced { previous_nonce: 3 })
    );
    assert_eq!(
        bob.store()
            .get(SignerCategory::Location, &card.signer_key())
            .unwrap()
            .nonce(),
        8
    );
}

#[tokio::test]
async fn test_batch_failure_does_not_stop_others() {
    let alice = session("alice");
    let bob = shared_session("bob");
    let carol = session("carol");
    let card = TestCard::secp256k1();

    let attestation = alice.tap(&card.tap(1), SignerCategory::Person).unwrap();
    let for_bob = alice
        .share_attestation(&attestation, &bob.keys().public_key())
        .unwrap();
    let for_carol = alice
        .share_attestation(&attestation, &carol.keys().public_key())
        .unwrap();
    let chat = alice
        .seal_message(
            &MessagePayload::from_parts("chat", json!({ "text": "hello" })).unwrap(),
            &bob.keys().public_key(),
        )
        .unwrap();

    let results = bob.ingest_batch(vec![for_carol, for_bob, chat]).await;

    assert!(matches!(
        results[0],
        Err(AttestError::Envelope(EnvelopeError::DecryptionFailed { .. }))
    ));
    assert_eq!(
        results[1].as_ref().unwrap().recorded,
        Some(RecordOutcome::Inserted)
    );
    assert!(results[2].as_ref().unwrap().recorded.is_none());
    assert_eq!(bob.store().total_len(), 1);
}

#[tokio::test]
async fn test_empty_batch() {
    let bob = shared_session("bob");
    assert!(bob.ingest_batch(Vec::new()).await.is_empty());
}
