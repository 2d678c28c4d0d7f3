//! Local attestation store
//!
//! Deduplicated collection of verified taps, partitioned by signer category.
//! Each (category, signer key) slot keeps the freshest attestation: a new one
//! replaces the old only when its nonce is strictly greater. The store never
//! grows past the number of distinct signers.
//!
//! Snapshots let the holder persist the store in whatever backend it uses;
//! `seal_snapshot` encrypts one at rest with AES-256-GCM.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{key_fingerprint, seal, unseal, SealError, SealKey, DOMAIN_STORE_SNAPSHOT_AAD};
use crate::domain::{PublicKey, SignerCategory, TapAttestation};

/// Current snapshot format version
pub const STORE_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot seal failed: {0}")]
    Seal(SealError),

    #[error("snapshot unseal failed: {0}")]
    Unseal(SealError),
}

/// What `record` did with an attestation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First attestation from this signer in this category
    Inserted,
    /// Replaced an older attestation with a lower nonce
    Replaced { previous_nonce: u32 },
    /// Kept the existing attestation; its nonce was not lower
    Ignored { existing_nonce: u32 },
}

impl RecordOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, RecordOutcome::Ignored { .. })
    }
}

/// Serializable store contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub attestations: Vec<TapAttestation>,
}

#[derive(Debug, Default)]
struct Partitions {
    person: BTreeMap<PublicKey, TapAttestation>,
    location: BTreeMap<PublicKey, TapAttestation>,
}

impl Partitions {
    fn get(&self, category: SignerCategory) -> &BTreeMap<PublicKey, TapAttestation> {
        match category {
            SignerCategory::Person => &self.person,
            SignerCategory::Location => &self.location,
        }
    }

    fn get_mut(&mut self, category: SignerCategory) -> &mut BTreeMap<PublicKey, TapAttestation> {
        match category {
            SignerCategory::Person => &mut self.person,
            SignerCategory::Location => &mut self.location,
        }
    }

    fn upsert(&mut self, attestation: TapAttestation) -> RecordOutcome {
        let slot = self.get_mut(attestation.category());
        match slot.get(attestation.signer_public_key()) {
            None => {
                slot.insert(attestation.signer_public_key().clone(), attestation);
                RecordOutcome::Inserted
            }
            Some(existing) if attestation.nonce() > existing.nonce() => {
                let previous_nonce = existing.nonce();
                slot.insert(attestation.signer_public_key().clone(), attestation);
                RecordOutcome::Replaced { previous_nonce }
            }
            Some(existing) => RecordOutcome::Ignored {
                existing_nonce: existing.nonce(),
            },
        }
    }
}

/// Attestation store owned by one session.
///
/// Writers are serialized by the lock; a reader sees either the old or the
/// new attestation for a slot, never a mix.
#[derive(Debug, Default)]
pub struct AttestationStore {
    inner: RwLock<Partitions>,
}

impl AttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replace if fresher, or ignore
    pub fn record(&self, attestation: TapAttestation) -> RecordOutcome {
        let signer = key_fingerprint(attestation.signer_public_key().as_bytes());
        let category = attestation.category();
        let nonce = attestation.nonce();

        let outcome = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(attestation);

        debug!(signer = %signer, category = %category, nonce, outcome = ?outcome, "attestation recorded");
        outcome
    }

    /// Distinct signer keys known for `category`
    pub fn list_signer_keys(&self, category: SignerCategory) -> BTreeSet<PublicKey> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(category).keys().cloned().collect()
    }

    pub fn get(&self, category: SignerCategory, signer: &PublicKey) -> Option<TapAttestation> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(category).get(signer).cloned()
    }

    pub fn len(&self, category: SignerCategory) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(category).len()
    }

    pub fn total_len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.person.len() + inner.location.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Wipe every category
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.person.len() + inner.location.len();
        *inner = Partitions::default();
        info!(removed, "attestation store cleared");
    }

    /// Copy of the store contents, persons first, each ordered by key
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let attestations = SignerCategory::ALL
            .iter()
            .flat_map(|c| inner.get(*c).values().cloned())
            .collect();
        StoreSnapshot {
            version: STORE_SNAPSHOT_VERSION,
            attestations,
        }
    }

    /// Merge a snapshot using the same freshness rule as `record`
    pub fn restore(&self, snapshot: StoreSnapshot) -> Result<usize, StoreError> {
        if snapshot.version != STORE_SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(snapshot.version));
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let changed = snapshot
            .attestations
            .into_iter()
            .filter(|a| inner.upsert(a.clone()).changed())
            .count();
        info!(changed, "attestation store restored");
        Ok(changed)
    }

    /// Snapshot and encrypt for storage at rest
    pub fn seal_snapshot(&self, key: &SealKey) -> Result<Vec<u8>, StoreError> {
        let bytes = serde_json::to_vec(&self.snapshot())?;
        seal(key, DOMAIN_STORE_SNAPSHOT_AAD, &bytes).map_err(StoreError::Seal)
    }

    /// Decrypt a sealed snapshot and merge it
    pub fn open_snapshot(&self, key: &SealKey, sealed: &[u8]) -> Result<usize, StoreError> {
        let bytes = unseal(key, DOMAIN_STORE_SNAPSHOT_AAD, sealed).map_err(StoreError::Unseal)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        self.restore(snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_seal_key;
    use crate::domain::CounterMessage;

    fn attestation(key: u8, nonce: u32, category: SignerCategory) -> TapAttestation {
        TapAttestation::new(
            PublicKey::from_bytes(vec![0x04, key]),
            CounterMessage::new(b"P".to_vec(), nonce, vec![key]),
            vec![0x30, key],
            category,
        )
    }

    #[test]
    fn test_record_is_idempotent() {
        let store = AttestationStore::new();
        let a = attestation(1, 5, SignerCategory::Person);

        assert_eq!(store.record(a.clone()), RecordOutcome::Inserted);
        let before = store.list_signer_keys(SignerCategory::Person);

        assert_eq!(
            store.record(a),
            RecordOutcome::Ignored { existing_nonce: 5 }
        );
        assert_eq!(store.list_signer_keys(SignerCategory::Person), before);
        assert_eq!(before.len(), 1);
    }

    #[test]
    fn test_fresher_nonce_replaces() {
        let store = AttestationStore::new();
        store.record(attestation(1, 5, SignerCategory::Person));

        assert_eq!(
            store.record(attestation(1, 3, SignerCategory::Person)),
            RecordOutcome::Ignored { existing_nonce: 5 }
        );
        assert_eq!(
            store.record(attestation(1, 8, SignerCategory::Person)),
            RecordOutcome::Replaced { previous_nonce: 5 }
        );

        let key = PublicKey::from_bytes(vec![0x04, 1]);
        assert_eq!(store.get(SignerCategory::Person, &key).unwrap().nonce(), 8);
        assert_eq!(store.len(SignerCategory::Person), 1);
    }

    #[test]
    fn test_categories_are_partitioned() {
        let store = AttestationStore::new();
        store.record(attestation(1, 1, SignerCategory::Person));
        store.record(attestation(1, 1, SignerCategory::Location));
        store.record(attestation(2, 1, SignerCategory::Location));

        assert_eq!(store.len(SignerCategory::Person), 1);
        assert_eq!(store.len(SignerCategory::Location), 2);
        assert_eq!(store.total_len(), 3);
    }

    #[test]
    fn test_clear() {
        let store = AttestationStore::new();
        store.record(attestation(1, 1, SignerCategory::Person));
        store.record(attestation(2, 1, SignerCategory::Location));
        store.clear();
        assert!(store.is_empty());
        assert!(store.list_signer_keys(SignerCategory::Location).is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let store = AttestationStore::new();
        store.record(attestation(2, 4, SignerCategory::Location));
        store.record(attestation(1, 7, SignerCategory::Person));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.attestations.len(), 2);
        assert_eq!(snapshot.attestations[0].category(), SignerCategory::Person);

        let restored = AttestationStore::new();
        assert_eq!(restored.restore(snapshot.clone()).unwrap(), 2);
        assert_eq!(restored.snapshot(), snapshot);

        // Merging the same data again changes nothing
        assert_eq!(restored.restore(snapshot).unwrap(), 0);
    }

    #[test]
    fn test_restore_rejects_unknown_version() {
        let store = AttestationStore::new();
        let snapshot = StoreSnapshot {
            version: 99,
            attestations: vec![],
        };
        assert!(matches!(
            store.restore(snapshot),
            Err(StoreError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_sealed_snapshot_roundtrip() {
        let key = generate_seal_key();
        let store = AttestationStore::new();
        store.record(attestation(1, 1, SignerCategory::Person));
        store.record(attestation(9, 3, SignerCategory::Location));

        let sealed = store.seal_snapshot(&key).unwrap();

        let restored = AttestationStore::new();
        assert_eq!(restored.open_snapshot(&key, &sealed).unwrap(), 2);
        assert_eq!(restored.snapshot(), store.snapshot());

        assert!(matches!(
            restored.open_snapshot(&generate_seal_key(), &sealed),
            Err(StoreError::Unseal(_))
        ));
    }

    #[test]
    fn test_concurrent_records_keep_highest_nonce() {
        let store = std::sync::Arc::new(AttestationStore::new());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..50u32 {
                        store.record(attestation(1, t * 50 + n, SignerCategory::Person));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let key = PublicKey::from_bytes(vec![0x04, 1]);
        assert_eq!(store.get(SignerCategory::Person, &key).unwrap().nonce(), 399);
        assert_eq!(store.len(SignerCategory::Person), 1);
    }
}
