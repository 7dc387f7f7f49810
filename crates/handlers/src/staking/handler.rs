//! Batch handler recording eras and validator exposures.
//!
//! Grandpa authority changes are the trigger: the first `NewAuthorities`
//! of an era is emitted in the block whose timestamp equals the era start.
//! State is then read at that block.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use sluice_core::decoding::{ItemKind, VersionedSchema, resolve};
use sluice_core::error::DomainResult;
use sluice_core::models::{AccountId, EntityMap};
use sluice_core::ports::{
    BatchContext, BatchHandler, BatchSource, HandlerOutputs, ItemSelector, RawBlock, Selection,
    StorageLookup, StorageQuery,
};

use super::models::{Era, EraValidator, Nomination};
use super::versions::{ActiveEraStorage, ErasStakersStorage, ExposureRecord, ValidatorsStorage};
use super::{BUNDLE, ERAS, ERA_VALIDATORS};

const NEW_AUTHORITIES: ItemKind = ItemKind::event("Grandpa", "NewAuthorities");

/// Read and decode a storage entry with the layout its fingerprint selects.
///
/// `None` when the runtime has no such entry or nothing is stored under
/// the key. An entry with an unknown layout is an error even when empty.
async fn read_storage<S: VersionedSchema>(
    source: &dyn BatchSource,
    block: &RawBlock,
    query: StorageQuery,
) -> DomainResult<Option<S::Record>> {
    match source.storage(&block.block_ref(), &query).await? {
        StorageLookup::Missing => Ok(None),
        StorageLookup::Present { fingerprint, value } => {
            let version = resolve::<S>(&fingerprint)?;
            value.map(|v| version.decode(&v)).transpose()
        }
    }
}

/// Records each era once, with the exposures of its validator set.
pub struct StakingHandler;

impl StakingHandler {
    async fn era_validators(
        &self,
        ctx: &BatchContext<'_>,
        block: &RawBlock,
        era: &Era,
    ) -> DomainResult<Vec<EraValidator>> {
        let validators = read_storage::<ValidatorsStorage>(
            ctx.source,
            block,
            StorageQuery::plain(ValidatorsStorage::KIND),
        )
        .await?
        .unwrap_or_default();

        let mut rows = Vec::with_capacity(validators.len());
        for validator in validators {
            let query = StorageQuery::map(
                ErasStakersStorage::KIND,
                vec![json!(era.index), json!(validator.to_hex())],
            );
            // A validator without a stored exposure is still recorded, with
            // zero bonds and no nominators.
            let exposure = read_storage::<ErasStakersStorage>(ctx.source, block, query)
                .await?
                .unwrap_or_default();
            rows.push(era_validator(ctx, era, &validator, exposure));
        }
        Ok(rows)
    }
}

fn era_validator(
    ctx: &BatchContext<'_>,
    era: &Era,
    validator: &AccountId,
    exposure: ExposureRecord,
) -> EraValidator {
    let validator_id = ctx.ss58.encode(validator);
    EraValidator {
        id: format!("{}-{}", era.index, validator_id),
        era_id: era.id.clone(),
        validator_id,
        self_bonded: exposure.own,
        total_bonded: exposure.total,
        nominators: exposure
            .others
            .iter()
            .map(|(who, amount)| Nomination {
                nominator_id: ctx.ss58.encode(who),
                amount: *amount,
            })
            .collect(),
    }
}

#[async_trait]
impl BatchHandler for StakingHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        Selection::new().with(ItemSelector::event(NEW_AUTHORITIES))
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let selection = self.selection();
        let mut eras = EntityMap::<Era>::new();
        let mut validators = EntityMap::<EraValidator>::new();

        for (block, _) in ctx.events(&selection) {
            let active = read_storage::<ActiveEraStorage>(
                ctx.source,
                block,
                StorageQuery::plain(ActiveEraStorage::KIND),
            )
            .await?;

            let Some(active) = active else { continue };
            if active.start.is_none() || active.start != block.timestamp {
                continue;
            }

            let era = Era {
                id: active.index.to_string(),
                index: active.index,
                started_at: block.number,
            };
            if eras.contains(&era.id) {
                continue;
            }

            info!(era = era.index, block = block.number, "📅 Processing era");
            for row in self.era_validators(ctx, block, &era).await? {
                validators.insert(row);
            }
            eras.insert(era);
        }

        let mut outputs = HandlerOutputs::new();
        outputs.extend(BUNDLE, ERAS, eras.into_values())?;
        outputs.extend(BUNDLE, ERA_VALIDATORS, validators.into_values())?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sluice_core::error::DomainError;
    use sluice_core::models::Ss58Codec;

    use crate::testing::{FakeSource, account, block, event, hex32};

    const ERA_START: u64 = 1_577_836_800_000 + 5 * 6_000;

    fn new_authorities(index: u32) -> sluice_core::ports::RawItem {
        event(index, ("Grandpa", "NewAuthorities"), &hex32(0x99), json!([]), None)
    }

    fn polkadot() -> Ss58Codec {
        Ss58Codec::for_network("polkadot").unwrap()
    }

    fn source_with_era(start: Option<u64>) -> FakeSource {
        FakeSource::new()
            .with_storage(
                StorageQuery::plain(ActiveEraStorage::KIND),
                ActiveEraStorage::V0.fingerprint(),
                Some(json!({"index": "7", "start": start.map(|s| s.to_string())})),
            )
            .with_storage(
                StorageQuery::plain(ValidatorsStorage::KIND),
                ValidatorsStorage::V0.fingerprint(),
                Some(json!([hex32(1), hex32(2)])),
            )
            .with_storage(
                StorageQuery::map(ErasStakersStorage::KIND, vec![json!(7), json!(hex32(1))]),
                ErasStakersStorage::V0.fingerprint(),
                Some(json!({"total": "300", "own": "100", "others": [{"who": hex32(9), "value": "200"}]})),
            )
    }

    #[tokio::test]
    async fn test_era_recorded_on_start_block() {
        let blocks = vec![block(4, vec![new_authorities(0)]), block(5, vec![new_authorities(0), new_authorities(1)])];
        let source = source_with_era(Some(ERA_START));
        let ctx = BatchContext::new(&blocks, &source, polkadot());

        let outputs = StakingHandler.handle_batch(&ctx).await.unwrap();

        let eras: Vec<Era> = outputs.get_typed(BUNDLE, ERAS).unwrap();
        assert_eq!(eras, vec![Era { id: "7".into(), index: 7, started_at: 5 }]);

        let validators: Vec<EraValidator> = outputs.get_typed(BUNDLE, ERA_VALIDATORS).unwrap();
        assert_eq!(validators.len(), 2);
        let first = validators
            .iter()
            .find(|v| v.validator_id == polkadot().encode(&account(1)))
            .unwrap();
        assert_eq!(first.id, format!("7-{}", first.validator_id));
        assert_eq!((first.self_bonded, first.total_bonded), (100, 300));
        assert_eq!(first.nominators[0].nominator_id, polkadot().encode(&account(9)));

        // Pas d'exposition stockée: valeurs nulles
        let second = validators.iter().find(|v| v.id != first.id).unwrap();
        assert_eq!((second.self_bonded, second.total_bonded), (0, 0));
        assert!(second.nominators.is_empty());

        // Deux déclencheurs dans le même bloc: les validateurs sont lus une fois
        assert_eq!(
            source.storage_reads.lock().unwrap().iter().filter(|k| k.starts_with("Session.Validators")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_exposure_keeps_validator_with_zero_bonds() {
        let blocks = vec![block(5, vec![new_authorities(0)])];
        let source = source_with_era(Some(ERA_START)).with_storage(
            StorageQuery::map(ErasStakersStorage::KIND, vec![json!(7), json!(hex32(2))]),
            ErasStakersStorage::V0.fingerprint(),
            None,
        );
        let ctx = BatchContext::new(&blocks, &source, polkadot());

        let outputs = StakingHandler.handle_batch(&ctx).await.unwrap();

        let validators: Vec<EraValidator> = outputs.get_typed(BUNDLE, ERA_VALIDATORS).unwrap();
        let empty = validators
            .iter()
            .find(|v| v.validator_id == polkadot().encode(&account(2)))
            .unwrap();
        assert_eq!(empty.id, format!("7-{}", empty.validator_id));
        assert_eq!((empty.self_bonded, empty.total_bonded), (0, 0));
        assert!(empty.nominators.is_empty());
    }

    #[tokio::test]
    async fn test_era_without_start_is_skipped() {
        let blocks = vec![block(5, vec![new_authorities(0)])];
        let source = source_with_era(None);
        let ctx = BatchContext::new(&blocks, &source, polkadot());

        assert!(StakingHandler.handle_batch(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_active_era_is_skipped() {
        let blocks = vec![block(5, vec![new_authorities(0)])];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, polkadot());

        assert!(StakingHandler.handle_batch(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_storage_layout_is_fatal() {
        let blocks = vec![block(5, vec![new_authorities(0)])];
        let source = FakeSource::new().with_storage(
            StorageQuery::plain(ActiveEraStorage::KIND),
            &hex32(0x42),
            None,
        );
        let ctx = BatchContext::new(&blocks, &source, polkadot());

        let err = StakingHandler.handle_batch(&ctx).await.unwrap_err();
        assert!(matches!(err, DomainError::UnknownSchemaVersion { .. }));
    }
}
