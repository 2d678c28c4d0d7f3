//! Requirement satisfaction engine
//!
//! Pure functions over a snapshot of known signer keys. A requirement is
//! satisfied when at least `numSigsRequired` of its distinct listed signers
//! are known; a quest's progress is the number of satisfied requirements.
//!
//! ```text
//! satisfied(req) = |{ listed keys } ∩ known| >= req.num_sigs_required
//! ```

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{LocationRequirement, PublicKey, Quest, UserRequirement};

/// Count distinct listed keys present in `known`
fn count_collected<'a>(
    listed: impl Iterator<Item = &'a PublicKey>,
    known: &BTreeSet<PublicKey>,
) -> u32 {
    let distinct: BTreeSet<&PublicKey> = listed.filter(|k| known.contains(*k)).collect();
    u32::try_from(distinct.len()).unwrap_or(u32::MAX)
}

fn user_collected(known_user_keys: &BTreeSet<PublicKey>, requirement: &UserRequirement) -> u32 {
    count_collected(
        requirement.users.iter().map(|u| &u.signature_public_key),
        known_user_keys,
    )
}

fn location_collected(
    known_location_keys: &BTreeSet<PublicKey>,
    requirement: &LocationRequirement,
) -> u32 {
    count_collected(
        requirement.locations.iter().map(|l| &l.signature_public_key),
        known_location_keys,
    )
}

pub fn is_user_requirement_satisfied(
    known_user_keys: &BTreeSet<PublicKey>,
    requirement: &UserRequirement,
) -> bool {
    user_collected(known_user_keys, requirement) >= requirement.num_sigs_required
}

pub fn is_location_requirement_satisfied(
    known_location_keys: &BTreeSet<PublicKey>,
    requirement: &LocationRequirement,
) -> bool {
    location_collected(known_location_keys, requirement) >= requirement.num_sigs_required
}

/// Number of satisfied requirements across both lists
pub fn compute_num_requirements_satisfied(
    known_user_keys: &BTreeSet<PublicKey>,
    known_location_keys: &BTreeSet<PublicKey>,
    user_requirements: &[UserRequirement],
    location_requirements: &[LocationRequirement],
) -> usize {
    let users = user_requirements
        .iter()
        .filter(|r| is_user_requirement_satisfied(known_user_keys, r))
        .count();
    let locations = location_requirements
        .iter()
        .filter(|r| is_location_requirement_satisfied(known_location_keys, r))
        .count();
    users + locations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementKind {
    User,
    Location,
}

/// Status of one requirement, for detail views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementProgress {
    pub kind: RequirementKind,
    pub name: String,
    pub collected: u32,
    pub required: u32,
    pub satisfied: bool,
}

/// Progress of a whole quest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub quest_id: u64,
    pub num_satisfied: usize,
    pub num_requirements: usize,
    pub requirements: Vec<RequirementProgress>,
}

impl QuestProgress {
    pub fn is_complete(&self) -> bool {
        self.num_satisfied == self.num_requirements
    }
}

/// Per-requirement progress, user requirements first, each in quest order
pub fn quest_progress(
    known_user_keys: &BTreeSet<PublicKey>,
    known_location_keys: &BTreeSet<PublicKey>,
    quest: &Quest,
) -> QuestProgress {
    let users = quest.user_requirements.iter().map(|r| {
        let collected = user_collected(known_user_keys, r);
        RequirementProgress {
            kind: RequirementKind::User,
            name: r.name.clone(),
            collected,
            required: r.num_sigs_required,
            satisfied: collected >= r.num_sigs_required,
        }
    });
    let locations = quest.location_requirements.iter().map(|r| {
        let collected = location_collected(known_location_keys, r);
        RequirementProgress {
            kind: RequirementKind::Location,
            name: r.name.clone(),
            collected,
            required: r.num_sigs_required,
            satisfied: collected >= r.num_sigs_required,
        }
    });

    let requirements: Vec<_> = users.chain(locations).collect();
    QuestProgress {
        quest_id: quest.id,
        num_satisfied: requirements.iter().filter(|r| r.satisfied).count(),
        num_requirements: requirements.len(),
        requirements,
    }
}

impl Quest {
    /// All requirements satisfied
    pub fn is_complete(
        &self,
        known_user_keys: &BTreeSet<PublicKey>,
        known_location_keys: &BTreeSet<PublicKey>,
    ) -> bool {
        compute_num_requirements_satisfied(
            known_user_keys,
            known_location_keys,
            &self.user_requirements,
            &self.location_requirements,
        ) == self.num_requirements()
    }
}
