//! Batch handler for `Balances.Transfer` events.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use sluice_core::decoding::{VersionedSchema, decode_versioned};
use sluice_core::error::DomainResult;
use sluice_core::models::{EntityMap, Ss58Codec, event_id};
use sluice_core::ports::{
    BatchContext, BatchHandler, HandlerOutputs, ItemSelector, RawBlock, RawEvent, Selection,
};

use crate::utils::block_timestamp;

use super::models::{Account, Transfer};
use super::storage::BalancesStorage;
use super::versions::TransferEvent;
use super::{ACCOUNTS, BUNDLE, TRANSFERS};

/// Folds transfers of a batch into `Account` and `Transfer` rows.
pub struct BalancesHandler {
    storage: Arc<dyn BalancesStorage>,
}

impl BalancesHandler {
    pub fn new(storage: Arc<dyn BalancesStorage>) -> Self {
        Self { storage }
    }
}

fn build_transfer(ss58: &Ss58Codec, block: &RawBlock, event: &RawEvent) -> DomainResult<Transfer> {
    let record = decode_versioned::<TransferEvent>(&event.fingerprint, &event.args)?;

    let timestamp = block_timestamp(block)?;
    let extrinsic = event.extrinsic.as_ref();
    Ok(Transfer {
        id: event_id(block.number, &block.hash, event.index),
        block_number: block.number,
        timestamp,
        extrinsic_hash: extrinsic.map(|e| e.hash.to_hex()),
        call: extrinsic.map(|e| e.call.clone()),
        from_id: ss58.encode(&record.from),
        to_id: ss58.encode(&record.to),
        amount: record.amount,
        fee: extrinsic.and_then(|e| e.fee),
    })
}

#[async_trait]
impl BatchHandler for BalancesHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        Selection::new().with(ItemSelector::event(TransferEvent::KIND))
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let selection = self.selection();
        let transfers = ctx
            .events(&selection)
            .map(|(block, event)| build_transfer(&ctx.ss58, block, event))
            .collect::<DomainResult<Vec<_>>>()?;

        let mut outputs = HandlerOutputs::new();
        if transfers.is_empty() {
            return Ok(outputs);
        }

        let ids: Vec<String> = transfers
            .iter()
            .flat_map(|t| [t.from_id.clone(), t.to_id.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut accounts = EntityMap::from_existing(self.storage.get_accounts(&ids).await?);
        let known = accounts.len();
        for id in &ids {
            accounts.get_or_insert_with(id, || Account { id: id.clone() });
        }

        debug!(
            transfers = transfers.len(),
            new_accounts = accounts.len() - known,
            "Folded balance transfers"
        );

        outputs.extend(BUNDLE, ACCOUNTS, accounts.into_values())?;
        outputs.extend(BUNDLE, TRANSFERS, transfers)?;
        Ok(outputs)
    }

    fn priority(&self) -> i32 {
        10
    }
}
