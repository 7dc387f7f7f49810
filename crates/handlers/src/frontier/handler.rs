//! Batch handler for ERC-721 transfers on a Frontier chain.
//!
//! Transfers come from `EVM.Log` events of one contract. The transaction
//! hash is taken from `Ethereum.Executed` in the same extrinsic, and the
//! token URI is read with `eth_call` the first time a token is seen.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use sluice_core::decoding::{VersionedSchema, decode_versioned};
use sluice_core::error::DomainResult;
use sluice_core::models::{EntityMap, H160, event_id};
use sluice_core::ports::{
    BatchContext, BatchHandler, HandlerOutputs, ItemSelector, RawBlock, RawEvent, Selection,
};

use crate::utils::block_timestamp;

use super::erc721::{TRANSFER_TOPIC, TransferLog, decode_string, decode_transfer, token_uri_call};
use super::models::{Contract, EvmTransfer, Owner, Token};
use super::storage::FrontierStorage;
use super::versions::{EvmLogEvent, ExecutedEvent};
use super::{BUNDLE, CONTRACTS, OWNERS, TOKENS, TRANSFERS};

/// Static description of the indexed contract.
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub address: H160,
    pub name: &'static str,
    pub symbol: &'static str,
    pub total_supply: u128,
}

impl ContractInfo {
    fn entity(&self) -> Contract {
        Contract {
            id: self.address.to_hex(),
            name: self.name.to_string(),
            symbol: self.symbol.to_string(),
            total_supply: self.total_supply,
        }
    }
}

pub struct FrontierHandler {
    storage: Arc<dyn FrontierStorage>,
    contract: ContractInfo,
}

impl FrontierHandler {
    pub fn new(storage: Arc<dyn FrontierStorage>, contract: ContractInfo) -> Self {
        Self { storage, contract }
    }

    fn log_selection(&self) -> Selection {
        Selection::new().with(ItemSelector::EvmLog {
            contract: self.contract.address,
            topic0: Some(TRANSFER_TOPIC),
        })
    }

    /// Transaction hashes of the extrinsics in `wanted`, keyed by
    /// `(height, extrinsic index)`.
    fn transaction_hashes(
        &self,
        ctx: &BatchContext<'_>,
        wanted: &HashSet<(u64, u32)>,
    ) -> DomainResult<HashMap<(u64, u32), String>> {
        let selection = Selection::new().with(ItemSelector::event(ExecutedEvent::KIND));
        let mut hashes = HashMap::new();

        for (block, event) in ctx.events(&selection) {
            let Some(extrinsic) = &event.extrinsic else { continue };
            let key = (block.number, extrinsic.index);
            if !wanted.contains(&key) {
                continue;
            }
            let executed = decode_versioned::<ExecutedEvent>(&event.fingerprint, &event.args)?;
            hashes.insert(key, format!("0x{}", hex::encode(executed.transaction_hash)));
        }
        Ok(hashes)
    }

    async fn token_uri(
        &self,
        ctx: &BatchContext<'_>,
        block: &RawBlock,
        log: &TransferLog,
    ) -> DomainResult<Option<String>> {
        let output = ctx
            .source
            .evm_call(&block.block_ref(), self.contract.address, token_uri_call(&log.token_id))
            .await?;
        if output.is_empty() {
            return Ok(None);
        }
        decode_string(&output).map(Some)
    }
}

fn extrinsic_key(block: &RawBlock, event: &RawEvent) -> Option<(u64, u32)> {
    event.extrinsic.as_ref().map(|e| (block.number, e.index))
}

#[async_trait]
impl BatchHandler for FrontierHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        self.log_selection()
            .with(ItemSelector::event(ExecutedEvent::KIND))
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let selection = self.log_selection();
        let logs = ctx
            .events(&selection)
            .map(|(block, event)| {
                let log = decode_versioned::<EvmLogEvent>(&event.fingerprint, &event.args)?;
                Ok((block, event, decode_transfer(&log)?))
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let mut outputs = HandlerOutputs::new();
        if logs.is_empty() {
            return Ok(outputs);
        }

        let wanted: HashSet<_> = logs.iter().filter_map(|(b, e, _)| extrinsic_key(b, e)).collect();
        let hashes = self.transaction_hashes(ctx, &wanted)?;

        let owner_ids: Vec<String> = logs
            .iter()
            .flat_map(|(_, _, t)| [t.from.to_hex(), t.to.to_hex()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let token_ids: Vec<String> = logs
            .iter()
            .map(|(_, _, t)| t.token_id_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let contract = match self.storage.get_contract(&self.contract.address.to_hex()).await? {
            Some(contract) => contract,
            None => self.contract.entity(),
        };
        let mut owners = EntityMap::from_existing(self.storage.get_owners(&owner_ids).await?);
        let mut tokens = EntityMap::from_existing(self.storage.get_tokens(&token_ids).await?);
        let mut transfers = Vec::with_capacity(logs.len());

        for (block, event, log) in &logs {
            let from_id = log.from.to_hex();
            let to_id = log.to.to_hex();
            let token_id = log.token_id_string();

            let from = owners.get_or_insert_with(&from_id, || Owner::new(&from_id));
            from.balance = from.balance.saturating_sub(1);
            owners.get_or_insert_with(&to_id, || Owner::new(&to_id)).balance += 1;

            match tokens.get_mut(&token_id) {
                Some(token) => token.owner_id = to_id.clone(),
                None => {
                    let uri = self.token_uri(ctx, block, log).await?;
                    tokens.insert(Token {
                        id: token_id.clone(),
                        uri,
                        contract_id: contract.id.clone(),
                        owner_id: to_id.clone(),
                    });
                }
            }

            transfers.push(EvmTransfer {
                id: event_id(block.number, &block.hash, event.index),
                block_number: block.number,
                timestamp: block_timestamp(block)?,
                transaction_hash: extrinsic_key(block, event).and_then(|k| hashes.get(&k).cloned()),
                from_id,
                to_id,
                token_id,
            });
        }

        debug!(
            transfers = transfers.len(),
            tokens = tokens.len(),
            owners = owners.len(),
            "Folded ERC-721 transfers"
        );

        outputs.add(BUNDLE, CONTRACTS, contract)?;
        outputs.extend(BUNDLE, OWNERS, owners.into_values())?;
        outputs.extend(BUNDLE, TOKENS, tokens.into_values())?;
        outputs.extend(BUNDLE, TRANSFERS, transfers)?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};
    use sluice_core::error::{DomainError, StorageResult};
    use sluice_core::models::Ss58Codec;
    use sluice_core::ports::RawItem;

    use crate::testing::{FakeSource, block, event, extrinsic, hex32};

    const CONTRACT: H160 = H160([0xb6; 20]);

    #[derive(Default)]
    struct KnownTokens {
        owners: Vec<Owner>,
        tokens: Vec<Token>,
    }

    #[async_trait]
    impl FrontierStorage for KnownTokens {
        async fn get_contract(&self, _: &str) -> StorageResult<Option<Contract>> {
            Ok(None)
        }

        async fn get_owners(&self, ids: &[String]) -> StorageResult<Vec<Owner>> {
            Ok(self.owners.iter().filter(|o| ids.contains(&o.id)).cloned().collect())
        }

        async fn get_tokens(&self, ids: &[String]) -> StorageResult<Vec<Token>> {
            Ok(self.tokens.iter().filter(|t| ids.contains(&t.id)).cloned().collect())
        }

        async fn get_token(&self, _: &str) -> StorageResult<Option<Token>> {
            Ok(None)
        }

        async fn list_tokens_by_owner(&self, _: &str) -> StorageResult<Vec<Token>> {
            Ok(Vec::new())
        }
    }

    fn address(byte: u8) -> H160 {
        H160([byte; 20])
    }

    fn word(value: u8) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[31] = value;
        word
    }

    fn padded(address: H160) -> String {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&address.0);
        format!("0x{}", hex::encode(word))
    }

    fn transfer_log(index: u32, ext: u32, from: H160, to: H160, token: u8) -> RawItem {
        let args = json!({"log": {
            "address": CONTRACT.to_hex(),
            "topics": [
                format!("0x{}", hex::encode(TRANSFER_TOPIC)),
                padded(from),
                padded(to),
                format!("0x{}", hex::encode(word(token))),
            ],
            "data": "0x",
        }});
        event(index, ("EVM", "Log"), EvmLogEvent::V1300.fingerprint(), args, Some(extrinsic(ext, "Ethereum.transact")))
    }

    fn executed(index: u32, ext: u32, tx: u8) -> RawItem {
        let args = json!({
            "from": address(1).to_hex(),
            "to": CONTRACT.to_hex(),
            "transaction_hash": hex32(tx),
            "exit_reason": {"Succeed": {"Stopped": []}},
        });
        event(index, ("Ethereum", "Executed"), ExecutedEvent::V1300.fingerprint(), args, Some(extrinsic(ext, "Ethereum.transact")))
    }

    fn abi_string(s: &str) -> Vec<u8> {
        let mut out = word(32).to_vec();
        out.extend_from_slice(&word(s.len() as u8));
        let mut body = s.as_bytes().to_vec();
        body.resize(32, 0);
        out.extend_from_slice(&body);
        out
    }

    fn handler(storage: KnownTokens) -> FrontierHandler {
        FrontierHandler::new(
            Arc::new(storage),
            ContractInfo {
                address: CONTRACT,
                name: "Moonsama",
                symbol: "MSAMA",
                total_supply: 1000,
            },
        )
    }

    fn moonriver() -> Ss58Codec {
        Ss58Codec::new(1285)
    }

    #[tokio::test]
    async fn test_mint_then_transfer() {
        let zero = address(0);
        let blocks = vec![block(
            100,
            vec![
                transfer_log(0, 1, zero, address(1), 7),
                executed(1, 1, 0xaa),
                transfer_log(2, 2, address(1), address(2), 7),
            ],
        )];
        let source = FakeSource::new().with_evm_result(token_uri_call(&word(7)), abi_string("ipfs://msama/7"));
        let ctx = BatchContext::new(&blocks, &source, moonriver());

        let outputs = handler(KnownTokens::default()).handle_batch(&ctx).await.unwrap();

        let tokens: Vec<Token> = outputs.get_typed(BUNDLE, TOKENS).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, "7");
        assert_eq!(tokens[0].uri.as_deref(), Some("ipfs://msama/7"));
        assert_eq!(tokens[0].owner_id, address(2).to_hex());
        assert_eq!(tokens[0].contract_id, CONTRACT.to_hex());

        // tokenURI lu une seule fois, au bloc du premier log
        let calls = source.evm_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 100);

        let owners: Vec<Owner> = outputs.get_typed(BUNDLE, OWNERS).unwrap();
        let balance = |a: H160| owners.iter().find(|o| o.id == a.to_hex()).map(|o| o.balance);
        assert_eq!(balance(zero), Some(0));
        assert_eq!(balance(address(1)), Some(0));
        assert_eq!(balance(address(2)), Some(1));

        let transfers: Vec<EvmTransfer> = outputs.get_typed(BUNDLE, TRANSFERS).unwrap();
        assert_eq!(transfers[0].transaction_hash, Some(hex32(0xaa)));
        // Pas d'Ethereum.Executed pour le deuxième extrinsic
        assert!(transfers[1].transaction_hash.is_none());

        let contracts: Vec<Contract> = outputs.get_typed(BUNDLE, CONTRACTS).unwrap();
        assert_eq!(contracts[0].symbol, "MSAMA");
    }

    #[tokio::test]
    async fn test_known_token_changes_owner_without_eth_call() {
        let storage = KnownTokens {
            owners: vec![Owner { id: address(1).to_hex(), balance: 3 }],
            tokens: vec![Token {
                id: "9".into(),
                uri: Some("ipfs://msama/9".into()),
                contract_id: CONTRACT.to_hex(),
                owner_id: address(1).to_hex(),
            }],
        };
        let blocks = vec![block(100, vec![transfer_log(0, 1, address(1), address(2), 9)])];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, moonriver());

        let outputs = handler(storage).handle_batch(&ctx).await.unwrap();

        let tokens: Vec<Token> = outputs.get_typed(BUNDLE, TOKENS).unwrap();
        assert_eq!(tokens[0].owner_id, address(2).to_hex());
        assert_eq!(tokens[0].uri.as_deref(), Some("ipfs://msama/9"));
        assert!(source.evm_calls.lock().unwrap().is_empty());

        let owners: Vec<Owner> = outputs.get_typed(BUNDLE, OWNERS).unwrap();
        assert!(owners.contains(&Owner { id: address(1).to_hex(), balance: 2 }));
    }

    #[tokio::test]
    async fn test_unknown_log_layout_is_fatal() {
        let mut item = transfer_log(0, 1, address(1), address(2), 1);
        if let RawItem::Event(e) = &mut item {
            e.fingerprint = crate::testing::fp(&hex32(0x13));
        }
        let blocks = vec![block(100, vec![item])];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, moonriver());

        let err = handler(KnownTokens::default()).handle_batch(&ctx).await.unwrap_err();
        assert!(matches!(err, DomainError::UnknownSchemaVersion { .. }));
    }

    #[test]
    fn test_selection_filters_contract_and_topic() {
        let selection = handler(KnownTokens::default()).selection();
        let other: Value = json!({"log": {"address": address(9).to_hex(), "topics": [], "data": "0x"}});
        let RawItem::Event(mut foreign) = transfer_log(0, 1, address(1), address(2), 1) else {
            unreachable!()
        };
        assert!(selection.matches_event(&foreign));
        foreign.args = other;
        assert!(!selection.matches_event(&foreign));
    }
}
