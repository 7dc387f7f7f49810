//! Substrate RPC client implementing the batch source port.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use futures::{StreamExt, TryStreamExt};
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::legacy::rpc_methods::RuntimeVersion as RpcRuntimeVersion;
use subxt::backend::rpc::RpcClient;
use subxt::ext::subxt_rpcs::rpc_params;
use subxt::blocks::{ExtrinsicDetails, Extrinsics};
use subxt::events::{EventDetails, Events, Phase};
use subxt::ext::codec::Decode;
use subxt::ext::scale_value::Value;
use subxt::utils::H256;
use subxt::{Metadata, OnlineClient, PolkadotConfig};
use tracing::{debug, info, instrument, trace};

use sluice_core::error::{ChainError, ChainResult};
use sluice_core::models::{AccountId, BlockHash, BlockRange, BlockRef, H160};
use sluice_core::ports::{
    BatchSource, CallOrigin, EventPhase, ExtrinsicInfo, FinalizedHead, RawBlock, RawCall,
    RawEvent, RawItem, Selection, StorageLookup, StorageQuery,
};

use crate::json::{JsonEncoder, json_to_key};
use crate::nested::{flatten_calls, wraps_calls};
use crate::runtime::{RuntimeCache, RuntimeView};

type Blake2b256 = Blake2b<U32>;

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
    /// Blocks of a batch fetched concurrently.
    pub fetch_concurrency: usize,
    /// Upper bound for fetching a single block.
    pub request_timeout: Duration,
}

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
            fetch_concurrency: 8,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Substrate client adapter implementing the BatchSource port.
///
/// Uses the legacy RPC methods so that any historical block of an archive
/// node can be read, decoding each one with the metadata of its own runtime.
pub struct SubstrateClient {
    config: SubstrateClientConfig,
    rpc: RpcClient,
    legacy: LegacyRpcMethods<PolkadotConfig>,
    genesis: H256,
    runtimes: RuntimeCache,
    /// Spec versions of the blocks in the last fetched batch.
    spec_by_block: Mutex<HashMap<BlockHash, u32>>,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let rpc = RpcClient::from_url(&config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let legacy = LegacyRpcMethods::<PolkadotConfig>::new(rpc.clone());
        let genesis = legacy
            .genesis_hash()
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        debug!(genesis = %hex::encode(genesis.0), "Connected successfully");

        Ok(Self {
            config,
            rpc,
            legacy,
            genesis,
            runtimes: RuntimeCache::default(),
            spec_by_block: Mutex::new(HashMap::new()),
        })
    }

    async fn block_hash(&self, number: u64) -> ChainResult<H256> {
        self.legacy
            .chain_get_block_hash(Some(number.into()))
            .await
            .map_err(|e| ChainError::BlockFetchError {
                number,
                message: e.to_string(),
            })?
            .ok_or_else(|| ChainError::BlockFetchError {
                number,
                message: "block not found".to_string(),
            })
    }

    /// Client for the runtime active at `hash`, loading its metadata once
    /// per spec version.
    async fn runtime_at(&self, hash: H256) -> ChainResult<std::sync::Arc<RuntimeView>> {
        let version = self
            .legacy
            .state_get_runtime_version(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let spec_version = version.spec_version;
        if let Some(view) = self.runtimes.get(spec_version).await {
            return Ok(view);
        }

        let raw: String = self
            .rpc
            .request("state_getMetadata", rpc_params![hash])
            .await
            .map_err(|e| ChainError::MetadataError(e.to_string()))?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| ChainError::MetadataError(e.to_string()))?;
        let metadata = Metadata::decode(&mut &bytes[..])
            .map_err(|e| ChainError::MetadataError(e.to_string()))?;

        let client = OnlineClient::<PolkadotConfig>::from_rpc_client_with(
            self.genesis,
            client_version(&version),
            metadata,
            self.rpc.clone(),
        )
        .map_err(|e| ChainError::MetadataError(e.to_string()))?;

        info!(spec_version, "🧬 Loaded runtime metadata");
        Ok(self
            .runtimes
            .insert(RuntimeView::new(spec_version, client))
            .await)
    }

    /// Fetch one block with the items `selection` asks for.
    #[instrument(skip(self, selection))]
    async fn fetch_block(&self, number: u64, selection: &Selection) -> ChainResult<RawBlock> {
        let hash = self.block_hash(number).await?;
        let view = self.runtime_at(hash).await?;
        let fetch_err = |e: subxt::Error| ChainError::BlockFetchError {
            number,
            message: e.to_string(),
        };

        let block = view.client.blocks().at(hash).await.map_err(fetch_err)?;
        let extrinsics = block.extrinsics().await.map_err(fetch_err)?;
        let events = block.events().await.map_err(fetch_err)?;

        let metadata = view.metadata();
        let encoder = JsonEncoder::new(metadata.types());
        let decoded_events = decode_events(&events, number)?;
        let infos = extrinsic_infos(&extrinsics, &decoded_events, &encoder, number)?;
        let timestamp = block_timestamp(&extrinsics, &encoder);

        let mut items = Vec::new();

        for ev in &decoded_events {
            if !wanted(selection, ev.pallet_name(), ev.variant_name()) {
                continue;
            }
            let phase = match ev.phase() {
                Phase::Initialization => EventPhase::Initialization,
                Phase::ApplyExtrinsic(index) => EventPhase::ApplyExtrinsic(index),
                Phase::Finalization => EventPhase::Finalization,
            };
            let args = ev
                .field_values()
                .map(|fields| encoder.fields(&fields))
                .map_err(fetch_err)?;
            let event = RawEvent {
                index: ev.index(),
                phase,
                pallet: ev.pallet_name().to_string(),
                name: ev.variant_name().to_string(),
                fingerprint: view.event_fingerprint(ev.pallet_name(), ev.variant_index())?,
                args,
                extrinsic: match phase {
                    EventPhase::ApplyExtrinsic(index) => infos.get(index as usize).cloned(),
                    _ => None,
                },
            };
            if selection.matches_event(&event) {
                items.push(RawItem::Event(event));
            }
        }

        for (ext, info) in extrinsics.iter().zip(&infos) {
            let (Ok(pallet), Ok(name)) = (ext.pallet_name(), ext.variant_name()) else {
                continue;
            };
            if !wanted(selection, pallet, name) && !wraps_calls(pallet, name) {
                continue;
            }
            let fields = ext.field_values().map_err(fetch_err)?;
            let origin = ext.address_bytes().map(origin_from_address);

            for node in flatten_calls(pallet, name, &fields, origin) {
                if !wanted(selection, node.pallet, node.name) {
                    continue;
                }
                let call = RawCall {
                    pallet: node.pallet.to_string(),
                    name: node.name.to_string(),
                    fingerprint: view.call_fingerprint(node.pallet, node.name)?,
                    args: encoder.fields(node.fields),
                    origin: node.origin,
                    extrinsic: info.clone(),
                    address: node.address,
                };
                if selection.matches_call(&call) {
                    items.push(RawItem::Call(call));
                }
            }
        }

        let mut raw = RawBlock {
            number,
            hash: BlockHash(hash.0),
            parent_hash: BlockHash(block.header().parent_hash.0),
            timestamp,
            spec_version: view.spec_version,
            items,
        };
        raw.sort_items();

        trace!(number, items = raw.items.len(), "Fetched block");
        Ok(raw)
    }
}

#[async_trait]
impl BatchSource for SubstrateClient {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(BlockHash(self.genesis.0))
    }

    async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
        let hash = self
            .legacy
            .chain_get_finalized_head()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let header = self
            .legacy
            .chain_get_header(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or_else(|| ChainError::RpcError("finalized header not found".to_string()))?;

        Ok(FinalizedHead {
            number: header.number as u64,
            hash: BlockHash(hash.0),
        })
    }

    #[instrument(skip(self, selection), fields(range = %range))]
    async fn fetch_batch(
        &self,
        range: BlockRange,
        selection: &Selection,
    ) -> ChainResult<Vec<RawBlock>> {
        let timeout = self.config.request_timeout;
        let blocks: Vec<RawBlock> = futures::stream::iter(range.from..=range.to)
            .map(|number| async move {
                tokio::time::timeout(timeout, self.fetch_block(number, selection))
                    .await
                    .map_err(|_| ChainError::Timeout(format!("block #{}", number)))?
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .try_collect()
            .await?;

        let mut specs = self
            .spec_by_block
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        specs.clear();
        specs.extend(blocks.iter().map(|b| (b.hash, b.spec_version)));

        Ok(blocks)
    }

    async fn storage(&self, block: &BlockRef, query: &StorageQuery) -> ChainResult<StorageLookup> {
        let hash = H256(block.hash.0);
        let known = self
            .spec_by_block
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&block.hash)
            .copied();
        let view = match known {
            Some(spec) => match self.runtimes.get(spec).await {
                Some(view) => view,
                None => self.runtime_at(hash).await?,
            },
            None => self.runtime_at(hash).await?,
        };

        let Some(fingerprint) = view.storage_fingerprint(&query.pallet, &query.entry) else {
            return Ok(StorageLookup::Missing);
        };

        let entry = format!("{}.{}", query.pallet, query.entry);
        let read_err = |e: subxt::Error| ChainError::StorageReadError {
            entry: entry.clone(),
            message: e.to_string(),
        };

        let keys: Vec<Value> = query
            .keys
            .iter()
            .map(json_to_key)
            .collect::<ChainResult<_>>()?;
        let address = subxt::dynamic::storage(query.pallet.as_str(), query.entry.as_str(), keys);
        let fetched = view
            .client
            .storage()
            .at(hash)
            .fetch(&address)
            .await
            .map_err(read_err)?;

        let metadata = view.metadata();
        let encoder = JsonEncoder::new(metadata.types());
        let value = match fetched {
            Some(thunk) => Some(encoder.value(&thunk.to_value().map_err(|e| read_err(e.into()))?)),
            None => None,
        };

        Ok(StorageLookup::Present { fingerprint, value })
    }

    async fn evm_call(
        &self,
        block: &BlockRef,
        contract: H160,
        data: Vec<u8>,
    ) -> ChainResult<Vec<u8>> {
        let request = serde_json::json!({
            "to": contract.to_hex(),
            "data": format!("0x{}", hex::encode(&data)),
        });
        let result: String = self
            .rpc
            .request(
                "eth_call",
                rpc_params![request, format!("0x{:x}", block.number)],
            )
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| ChainError::RpcError(format!("invalid eth_call result: {}", e)))
    }
}

// =============================================================================
// Block decoding helpers
// =============================================================================

type SubstrateEvent = EventDetails<PolkadotConfig>;
type SubstrateExtrinsic = ExtrinsicDetails<PolkadotConfig, OnlineClient<PolkadotConfig>>;

fn wanted(selection: &Selection, pallet: &str, name: &str) -> bool {
    selection
        .items
        .iter()
        .any(|s| s.item_name() == (pallet, name))
}

/// Decode all events of a block.
///
/// Events are length-less SCALE, so one undecodable event makes the rest
/// of the block unreadable and fails the fetch.
fn decode_events(events: &Events<PolkadotConfig>, number: u64) -> ChainResult<Vec<SubstrateEvent>> {
    events
        .iter()
        .map(|ev| {
            ev.map_err(|e| ChainError::BlockFetchError {
                number,
                message: format!("event decoding failed: {}", e),
            })
        })
        .collect()
}

/// Hash, call name, fee and result of every extrinsic in the block.
fn extrinsic_infos(
    extrinsics: &Extrinsics<PolkadotConfig, OnlineClient<PolkadotConfig>>,
    events: &[SubstrateEvent],
    encoder: &JsonEncoder<'_>,
    number: u64,
) -> ChainResult<Vec<ExtrinsicInfo>> {
    let mut infos: Vec<ExtrinsicInfo> = extrinsics
        .iter()
        .map(|ext| extrinsic_info(&ext))
        .collect();

    for ev in events {
        let Phase::ApplyExtrinsic(index) = ev.phase() else {
            continue;
        };
        let Some(info) = infos.get_mut(index as usize) else {
            return Err(ChainError::BlockFetchError {
                number,
                message: format!("event {} references missing extrinsic {}", ev.index(), index),
            });
        };
        match (ev.pallet_name(), ev.variant_name()) {
            ("System", "ExtrinsicFailed") => info.success = false,
            ("TransactionPayment", "TransactionFeePaid") => {
                info.fee = ev
                    .field_values()
                    .ok()
                    .map(|fields| encoder.fields(&fields))
                    .as_ref()
                    .and_then(|args| args.get("actual_fee"))
                    .and_then(serde_json::Value::as_str)
                    .and_then(|fee| fee.parse().ok());
            }
            _ => {}
        }
    }

    Ok(infos)
}

fn extrinsic_info(ext: &SubstrateExtrinsic) -> ExtrinsicInfo {
    let pallet = ext.pallet_name().unwrap_or("Unknown");
    let call = ext.variant_name().unwrap_or("unknown");

    ExtrinsicInfo {
        index: ext.index(),
        hash: BlockHash(Blake2b256::digest(ext.bytes()).into()),
        call: format!("{}.{}", pallet, call),
        fee: None,
        success: true,
    }
}

/// Origin of a signed extrinsic from its encoded address.
fn origin_from_address(address: &[u8]) -> CallOrigin {
    match address {
        // MultiAddress::Id
        [0, account @ ..] if account.len() == 32 => account_origin(account),
        account if account.len() == 32 => account_origin(account),
        other => CallOrigin::Other(format!("0x{}", hex::encode(other))),
    }
}

fn account_origin(bytes: &[u8]) -> CallOrigin {
    let mut account = [0u8; 32];
    account.copy_from_slice(bytes);
    CallOrigin::Signed(AccountId(account))
}

/// Get timestamp from the `Timestamp.set` inherent.
fn block_timestamp(
    extrinsics: &Extrinsics<PolkadotConfig, OnlineClient<PolkadotConfig>>,
    encoder: &JsonEncoder<'_>,
) -> Option<u64> {
    extrinsics
        .iter()
        .find(|ext| {
            matches!(
                (ext.pallet_name(), ext.variant_name()),
                (Ok("Timestamp"), Ok("set"))
            )
        })
        .and_then(|ext| ext.field_values().ok())
        .map(|fields| encoder.fields(&fields))
        .as_ref()
        .and_then(|args| args.get("now"))
        .and_then(serde_json::Value::as_str)
        .and_then(|now| now.parse().ok())
}

/// Versions the online client is built with, from the block's own
/// `state_getRuntimeVersion` answer.
fn client_version(version: &RpcRuntimeVersion) -> subxt::client::RuntimeVersion {
    subxt::client::RuntimeVersion {
        spec_version: version.spec_version,
        transaction_version: version.transaction_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_version_from_rpc_answer() {
        let rpc: RpcRuntimeVersion = serde_json::from_value(serde_json::json!({
            "specName": "kusama",
            "specVersion": 9430,
            "transactionVersion": 24,
            "apis": []
        }))
        .unwrap();

        let version = client_version(&rpc);
        assert_eq!(version.spec_version, 9430);
        assert_eq!(version.transaction_version, 24);
    }

    #[test]
    fn test_origin_from_multi_address() {
        let mut address = vec![0u8];
        address.extend_from_slice(&[7u8; 32]);
        assert_eq!(
            origin_from_address(&address),
            CallOrigin::Signed(AccountId([7; 32]))
        );
        assert_eq!(
            origin_from_address(&[9u8; 32]),
            CallOrigin::Signed(AccountId([9; 32]))
        );
    }

    // Moonbeam signe avec des adresses de 20 octets
    #[test]
    fn test_origin_from_short_address() {
        assert_eq!(
            origin_from_address(&[0xaa; 20]),
            CallOrigin::Other(format!("0x{}", "aa".repeat(20)))
        );
    }

    #[test]
    fn test_extrinsic_hash_is_blake2_256() {
        // blake2b-256 of the empty input
        let digest: [u8; 32] = Blake2b256::digest(b"").into();
        assert_eq!(
            hex::encode(digest),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }
}
