//! In-memory fixtures shared by the bundle tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use sluice_core::error::ChainResult;
use sluice_core::models::{AccountId, BlockHash, BlockRange, BlockRef, H160, SchemaFingerprint};
use sluice_core::ports::{
    BatchSource, CallOrigin, EventPhase, ExtrinsicInfo, FinalizedHead, RawBlock, RawCall,
    RawEvent, RawItem, Selection, StorageLookup, StorageQuery,
};

/// Source answering storage reads and EVM calls from canned responses.
#[derive(Default)]
pub struct FakeSource {
    storage: HashMap<String, StorageLookup>,
    evm_results: HashMap<Vec<u8>, Vec<u8>>,
    pub evm_calls: Mutex<Vec<(u64, H160, Vec<u8>)>>,
    pub storage_reads: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with a present value of the given layout.
    pub fn with_storage(mut self, query: StorageQuery, fingerprint: &str, value: Option<Value>) -> Self {
        self.storage.insert(
            storage_key(&query),
            StorageLookup::Present {
                fingerprint: fp(fingerprint),
                value,
            },
        );
        self
    }

    pub fn with_evm_result(mut self, data: Vec<u8>, result: Vec<u8>) -> Self {
        self.evm_results.insert(data, result);
        self
    }
}

fn storage_key(query: &StorageQuery) -> String {
    format!("{}.{}{}", query.pallet, query.entry, Value::Array(query.keys.clone()))
}

#[async_trait]
impl BatchSource for FakeSource {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(BlockHash([0; 32]))
    }

    async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
        Ok(FinalizedHead {
            number: 0,
            hash: BlockHash([0; 32]),
        })
    }

    async fn fetch_batch(&self, _: BlockRange, _: &Selection) -> ChainResult<Vec<RawBlock>> {
        Ok(Vec::new())
    }

    async fn storage(&self, _: &BlockRef, query: &StorageQuery) -> ChainResult<StorageLookup> {
        let key = storage_key(query);
        self.storage_reads.lock().unwrap().push(key.clone());
        Ok(self
            .storage
            .get(&key)
            .cloned()
            .unwrap_or(StorageLookup::Missing))
    }

    async fn evm_call(&self, block: &BlockRef, contract: H160, data: Vec<u8>) -> ChainResult<Vec<u8>> {
        self.evm_calls
            .lock()
            .unwrap()
            .push((block.number, contract, data.clone()));
        Ok(self.evm_results.get(&data).cloned().unwrap_or_default())
    }
}

pub fn fp(hex: &str) -> SchemaFingerprint {
    SchemaFingerprint::from_hex(hex).unwrap()
}

pub fn account(byte: u8) -> AccountId {
    AccountId([byte; 32])
}

pub fn hex32(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 32]))
}

pub fn extrinsic(index: u32, call: &str) -> ExtrinsicInfo {
    ExtrinsicInfo {
        index,
        hash: BlockHash([0xee; 32]),
        call: call.to_string(),
        fee: Some(1_000),
        success: true,
    }
}

pub fn event(
    index: u32,
    kind: (&str, &str),
    fingerprint: &str,
    args: Value,
    extrinsic: Option<ExtrinsicInfo>,
) -> RawItem {
    RawItem::Event(RawEvent {
        index,
        phase: match &extrinsic {
            Some(ext) => EventPhase::ApplyExtrinsic(ext.index),
            None => EventPhase::Finalization,
        },
        pallet: kind.0.to_string(),
        name: kind.1.to_string(),
        fingerprint: fp(fingerprint),
        args,
        extrinsic,
    })
}

pub fn call(
    ext: u32,
    kind: (&str, &str),
    fingerprint: &str,
    args: Value,
    origin: Option<CallOrigin>,
) -> RawItem {
    RawItem::Call(RawCall {
        pallet: kind.0.to_string(),
        name: kind.1.to_string(),
        fingerprint: fp(fingerprint),
        args,
        origin,
        extrinsic: extrinsic(ext, &format!("{}.{}", kind.0, kind.1)),
        address: Vec::new(),
    })
}

/// Block `number` at 6 second slots from 2020-01-01.
pub fn block(number: u64, items: Vec<RawItem>) -> RawBlock {
    RawBlock {
        number,
        hash: BlockHash([number as u8; 32]),
        parent_hash: BlockHash([number.wrapping_sub(1) as u8; 32]),
        timestamp: Some(1_577_836_800_000 + number * 6_000),
        spec_version: 9130,
        items,
    }
}
