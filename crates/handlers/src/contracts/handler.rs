//! Batch handler for an ink! ERC-20 contract.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use sluice_core::decoding::decode_versioned;
use sluice_core::error::DomainResult;
use sluice_core::models::{AccountId, EntityMap, event_id};
use sluice_core::ports::{BatchContext, BatchHandler, HandlerOutputs, ItemSelector, Selection};

use crate::utils::block_timestamp;

use super::erc20::{Erc20Event, decode_event};
use super::models::{InkAccount, InkTransfer};
use super::storage::ContractsStorage;
use super::versions::ContractEmittedEvent;
use super::{ACCOUNTS, BUNDLE, TRANSFERS};

pub struct ContractsHandler {
    storage: Arc<dyn ContractsStorage>,
    contract: AccountId,
}

impl ContractsHandler {
    pub fn new(storage: Arc<dyn ContractsStorage>, contract: AccountId) -> Self {
        Self { storage, contract }
    }
}

#[async_trait]
impl BatchHandler for ContractsHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        Selection::new().with(ItemSelector::ContractEmitted {
            contract: self.contract,
        })
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let selection = self.selection();
        let mut transfers = Vec::new();

        for (block, event) in ctx.events(&selection) {
            let emitted = decode_versioned::<ContractEmittedEvent>(&event.fingerprint, &event.args)?;
            match decode_event(&emitted.data)? {
                Erc20Event::Transfer { from, to, value } => transfers.push(InkTransfer {
                    id: event_id(block.number, &block.hash, event.index),
                    from_id: from.map(|a| ctx.ss58.encode(&AccountId(a))),
                    to_id: to.map(|a| ctx.ss58.encode(&AccountId(a))),
                    amount: value,
                    block_number: block.number,
                    timestamp: block_timestamp(block)?,
                }),
                Erc20Event::Approval { .. } => {
                    trace!(block = block.number, index = event.index, "Skipping approval");
                }
            }
        }

        let mut outputs = HandlerOutputs::new();
        if transfers.is_empty() {
            return Ok(outputs);
        }

        let ids: Vec<String> = transfers
            .iter()
            .flat_map(|t| [t.from_id.clone(), t.to_id.clone()])
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut accounts = EntityMap::from_existing(self.storage.get_accounts(&ids).await?);
        for id in &ids {
            accounts.get_or_insert_with(id, || InkAccount { id: id.clone() });
        }

        debug!(transfers = transfers.len(), accounts = accounts.len(), "Folded ink! transfers");

        outputs.extend(BUNDLE, ACCOUNTS, accounts.into_values())?;
        outputs.extend(BUNDLE, TRANSFERS, transfers)?;
        Ok(outputs)
    }
}
