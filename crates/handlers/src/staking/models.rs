//! Models for the staking bundle.

use serde::{Deserialize, Serialize};

use sluice_core::models::{Entity, u128_str};

/// A staking era, recorded in the block where it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Era {
    /// Era index as a string.
    pub id: String,
    pub index: u32,
    /// Height of the block that started the era.
    pub started_at: u64,
}

impl Entity for Era {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One nominator's stake behind a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
    pub nominator_id: String,
    #[serde(with = "u128_str")]
    pub amount: u128,
}

/// A validator's exposure in one era.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraValidator {
    /// `{era}-{validator address}`
    pub id: String,
    pub era_id: String,
    pub validator_id: String,
    #[serde(with = "u128_str")]
    pub self_bonded: u128,
    #[serde(with = "u128_str")]
    pub total_bonded: u128,
    pub nominators: Vec<Nomination>,
}

impl Entity for EraValidator {
    fn id(&self) -> &str {
        &self.id
    }
}
