//! GraphQL types and queries for the staking bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use super::models::{Era as EraModel, EraValidator as EraValidatorModel, Nomination as NominationModel};
use super::storage::StakingStorage;

#[derive(async_graphql::SimpleObject)]
pub struct Era {
    pub id: String,
    pub index: i64,
    /// Height of the first block of the era.
    pub started_at: i64,
}

impl From<EraModel> for Era {
    fn from(e: EraModel) -> Self {
        Self {
            id: e.id,
            index: i64::from(e.index),
            started_at: e.started_at as i64,
        }
    }
}

#[derive(async_graphql::SimpleObject)]
pub struct Nomination {
    pub nominator_id: String,
    pub amount: String,
}

impl From<NominationModel> for Nomination {
    fn from(n: NominationModel) -> Self {
        Self {
            nominator_id: n.nominator_id,
            amount: n.amount.to_string(),
        }
    }
}

#[derive(async_graphql::SimpleObject)]
pub struct EraValidator {
    pub id: String,
    pub era_id: String,
    pub validator_id: String,
    pub self_bonded: String,
    pub total_bonded: String,
    pub nominators: Vec<Nomination>,
}

impl From<EraValidatorModel> for EraValidator {
    fn from(v: EraValidatorModel) -> Self {
        Self {
            id: v.id,
            era_id: v.era_id,
            validator_id: v.validator_id,
            self_bonded: v.self_bonded.to_string(),
            total_bonded: v.total_bonded.to_string(),
            nominators: v.nominators.into_iter().map(Nomination::from).collect(),
        }
    }
}

fn era_index(index: i32) -> Result<u32> {
    u32::try_from(index).map_err(|_| async_graphql::Error::new("era index must be positive"))
}

/// GraphQL query root for the staking bundle.
#[derive(Default)]
pub struct StakingQuery;

#[Object]
impl StakingQuery {
    /// Get an era by index.
    async fn era<'ctx>(&self, ctx: &Context<'ctx>, index: i32) -> Result<Option<Era>> {
        let staking = ctx.data::<Arc<dyn StakingStorage>>()?;
        Ok(staking.get_era(era_index(index)?).await?.map(Era::from))
    }

    /// Validators of an era, largest total stake first.
    async fn era_validators<'ctx>(&self, ctx: &Context<'ctx>, era: i32) -> Result<Vec<EraValidator>> {
        let staking = ctx.data::<Arc<dyn StakingStorage>>()?;
        let validators = staking.list_era_validators(era_index(era)?).await?;
        Ok(validators.into_iter().map(EraValidator::from).collect())
    }
}
