//! Quest and requirement definitions.
//!
//! These are authored outside this crate and deserialized as-is; the
//! requirement engine in [`crate::quest`] only reads them.

use serde::{Deserialize, Serialize};

use super::types::PublicKey;

/// A person whose tap counts toward a user requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementUser {
    pub display_name: String,
    pub signature_public_key: PublicKey,
}

/// A location whose tap counts toward a location requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementLocation {
    pub name: String,
    pub signature_public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequirement {
    pub name: String,
    pub num_sigs_required: u32,
    pub users: Vec<RequirementUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequirement {
    pub name: String,
    pub num_sigs_required: u32,
    pub locations: Vec<RequirementLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub user_requirements: Vec<UserRequirement>,
    #[serde(default)]
    pub location_requirements: Vec<LocationRequirement>,
}

impl Quest {
    pub fn num_requirements(&self) -> usize {
        self.user_requirements.len() + self.location_requirements.len()
    }
}
