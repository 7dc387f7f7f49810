//! Port trait for the batch data source.
//!
//! This trait defines the interface for fetching contiguous block ranges
//! with the items a processor selected, plus the state reads handlers need
//! while materializing entities. Implementations live in the
//! infrastructure layer (e.g., `sluice-substrate`).

use async_trait::async_trait;
use serde_json::Value;

use crate::decoding::ItemKind;
use crate::error::{ChainResult, DomainError, DomainResult};
use crate::models::{AccountId, BlockHash, BlockRange, BlockRef, H160, SchemaFingerprint};

// =============================================================================
// Selection
// =============================================================================

/// One kind of item a processor wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSelector {
    /// Every event of `pallet.name`.
    Event { pallet: String, name: String },
    /// Calls of `pallet.name`. Failed extrinsics are dropped unless
    /// `include_failed` is set.
    Call {
        pallet: String,
        name: String,
        include_failed: bool,
    },
    /// `EVM.Log` events emitted by `contract`, optionally filtered on topic0.
    EvmLog {
        contract: H160,
        topic0: Option<[u8; 32]>,
    },
    /// `Contracts.ContractEmitted` events of one ink! contract.
    ContractEmitted { contract: AccountId },
}

impl ItemSelector {
    pub fn event(kind: ItemKind) -> Self {
        Self::Event {
            pallet: kind.pallet.to_string(),
            name: kind.name.to_string(),
        }
    }

    /// Calls from successful extrinsics only.
    pub fn call(kind: ItemKind) -> Self {
        Self::Call {
            pallet: kind.pallet.to_string(),
            name: kind.name.to_string(),
            include_failed: false,
        }
    }

    /// Whether an event passes this selector.
    pub fn matches_event(&self, event: &RawEvent) -> bool {
        match self {
            Self::Event { pallet, name } => event.pallet == *pallet && event.name == *name,
            Self::EvmLog { contract, topic0 } => {
                if event.pallet != "EVM" || event.name != "Log" {
                    return false;
                }
                let Some(log) = evm_log_fields(&event.args) else {
                    return false;
                };
                let address_matches = log
                    .get("address")
                    .and_then(Value::as_str)
                    .and_then(|a| H160::from_hex(a).ok())
                    .is_some_and(|a| a == *contract);
                let topic_matches = match topic0 {
                    None => true,
                    Some(expected) => log
                        .get("topics")
                        .and_then(|t| t.get(0))
                        .and_then(Value::as_str)
                        .and_then(|t| BlockHash::from_hex(t).ok())
                        .is_some_and(|t| t.0 == *expected),
                };
                address_matches && topic_matches
            }
            Self::ContractEmitted { contract } => {
                event.pallet == "Contracts"
                    && event.name == "ContractEmitted"
                    && event
                        .args
                        .get("contract")
                        .and_then(Value::as_str)
                        .and_then(|c| AccountId::from_hex(c).ok())
                        .is_some_and(|c| c == *contract)
            }
            Self::Call { .. } => false,
        }
    }

    /// Whether a call passes this selector.
    pub fn matches_call(&self, call: &RawCall) -> bool {
        match self {
            Self::Call {
                pallet,
                name,
                include_failed,
            } => {
                call.pallet == *pallet
                    && call.name == *name
                    && (*include_failed || call.extrinsic.success)
            }
            _ => false,
        }
    }

    /// `Pallet.name` of the events or calls this selector can match.
    pub fn item_name(&self) -> (&str, &str) {
        match self {
            Self::Event { pallet, name } | Self::Call { pallet, name, .. } => (pallet, name),
            Self::EvmLog { .. } => ("EVM", "Log"),
            Self::ContractEmitted { .. } => ("Contracts", "ContractEmitted"),
        }
    }
}

/// `EVM.Log` carries a single `log` struct, positional in early runtimes
/// and named later.
fn evm_log_fields(args: &Value) -> Option<&Value> {
    match args {
        Value::Object(map) if map.contains_key("log") => map.get("log"),
        Value::Object(map) if map.contains_key("address") => Some(args),
        Value::Array(values) if values.len() == 1 => values.first(),
        _ => None,
    }
}

/// Set of item selectors requested by the registered handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub items: Vec<ItemSelector>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: ItemSelector) -> Self {
        self.add(selector);
        self
    }

    pub fn add(&mut self, selector: ItemSelector) {
        if !self.items.contains(&selector) {
            self.items.push(selector);
        }
    }

    pub fn merge(&mut self, other: Selection) {
        for selector in other.items {
            self.add(selector);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn matches_event(&self, event: &RawEvent) -> bool {
        self.items.iter().any(|s| s.matches_event(event))
    }

    pub fn matches_call(&self, call: &RawCall) -> bool {
        self.items.iter().any(|s| s.matches_call(call))
    }
}

// =============================================================================
// Raw items
// =============================================================================

/// Extrinsic an item belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicInfo {
    /// Index in block.
    pub index: u32,
    /// Extrinsic hash.
    pub hash: BlockHash,
    /// `Pallet.call` of the outer call.
    pub call: String,
    /// Fee paid, when the runtime reports it.
    pub fee: Option<u128>,
    /// Success flag.
    pub success: bool,
}

/// Dispatch origin of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOrigin {
    Signed(AccountId),
    Root,
    None,
    Other(String),
}

impl CallOrigin {
    /// The signing account, or [`DomainError::UnexpectedOrigin`].
    pub fn signer(&self) -> DomainResult<&AccountId> {
        match self {
            CallOrigin::Signed(account) => Ok(account),
            other => Err(DomainError::UnexpectedOrigin(format!("{:?}", other))),
        }
    }
}

/// When during block execution an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Initialization,
    ApplyExtrinsic(u32),
    Finalization,
}

/// Raw event data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Index in block.
    pub index: u32,
    /// Execution phase.
    pub phase: EventPhase,
    /// Pallet name.
    pub pallet: String,
    /// Event variant name.
    pub name: String,
    /// Fingerprint of the event's layout at this block.
    pub fingerprint: SchemaFingerprint,
    /// Event fields as JSON.
    pub args: Value,
    /// Emitting extrinsic (None for initialization/finalization events).
    pub extrinsic: Option<ExtrinsicInfo>,
}

/// Raw call data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    /// Pallet name.
    pub pallet: String,
    /// Call name.
    pub name: String,
    /// Fingerprint of the call's layout at this block.
    pub fingerprint: SchemaFingerprint,
    /// Call arguments as JSON.
    pub args: Value,
    /// Dispatch origin (None for unsigned extrinsics).
    pub origin: Option<CallOrigin>,
    /// Enclosing extrinsic.
    pub extrinsic: ExtrinsicInfo,
    /// Path of the call inside its extrinsic: empty for the extrinsic's own
    /// call, `[2, 0]` for the first call wrapped by the third call of a batch.
    pub address: Vec<u32>,
}

/// One item attributed to a block.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Event(RawEvent),
    Call(RawCall),
}

impl RawItem {
    /// Sort key inside a block.
    ///
    /// Initialization events come first, then each extrinsic's calls in
    /// depth-first order followed by its events, then finalization events.
    pub fn position(&self) -> (u8, u32, u8, u32, &[u32]) {
        match self {
            RawItem::Call(call) => (1, call.extrinsic.index, 0, 0, call.address.as_slice()),
            RawItem::Event(event) => match event.phase {
                EventPhase::Initialization => (0, 0, 0, event.index, &[]),
                EventPhase::ApplyExtrinsic(index) => (1, index, 1, event.index, &[]),
                EventPhase::Finalization => (2, 0, 0, event.index, &[]),
            },
        }
    }

    pub fn pallet(&self) -> &str {
        match self {
            RawItem::Event(e) => &e.pallet,
            RawItem::Call(c) => &c.pallet,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RawItem::Event(e) => &e.name,
            RawItem::Call(c) => &c.name,
        }
    }
}

/// Raw block data with its selected items in block order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Parent hash.
    pub parent_hash: BlockHash,
    /// Block timestamp in ms (from the `Timestamp.set` inherent).
    pub timestamp: Option<u64>,
    /// Runtime spec version active at this block.
    pub spec_version: u32,
    /// Selected items.
    pub items: Vec<RawItem>,
}

impl RawBlock {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            number: self.number,
            hash: self.hash,
        }
    }

    /// Sort items by their position inside the block.
    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| a.position().cmp(&b.position()));
    }
}

/// Current finalized head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedHead {
    pub number: u64,
    pub hash: BlockHash,
}

// =============================================================================
// Storage reads
// =============================================================================

/// A storage read at a given block.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageQuery {
    pub pallet: String,
    pub entry: String,
    /// Map keys as JSON, one per hasher. Empty for plain values.
    pub keys: Vec<Value>,
}

impl StorageQuery {
    pub fn plain(kind: ItemKind) -> Self {
        Self {
            pallet: kind.pallet.to_string(),
            entry: kind.name.to_string(),
            keys: Vec::new(),
        }
    }

    pub fn map(kind: ItemKind, keys: Vec<Value>) -> Self {
        Self {
            pallet: kind.pallet.to_string(),
            entry: kind.name.to_string(),
            keys,
        }
    }
}

/// Result of a storage read.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageLookup {
    /// The runtime at this block has no such entry.
    Missing,
    /// The entry exists; `value` is None when nothing is stored under the key.
    Present {
        fingerprint: SchemaFingerprint,
        value: Option<Value>,
    },
}

// =============================================================================
// Port
// =============================================================================

/// Port trait for the batch data source.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Get the genesis hash of the connected chain.
    async fn genesis_hash(&self) -> ChainResult<BlockHash>;

    /// Get the current finalized block head.
    async fn finalized_head(&self) -> ChainResult<FinalizedHead>;

    /// Fetch every block of `range` in ascending order, each carrying the
    /// items matched by `selection` sorted by [`RawItem::position`].
    ///
    /// Blocks without matching items are still returned.
    async fn fetch_batch(&self, range: BlockRange, selection: &Selection)
    -> ChainResult<Vec<RawBlock>>;

    /// Read a storage entry at `block`.
    async fn storage(&self, block: &BlockRef, query: &StorageQuery) -> ChainResult<StorageLookup>;

    /// Execute a read-only EVM call (`eth_call`) at `block`.
    async fn evm_call(&self, block: &BlockRef, contract: H160, data: Vec<u8>)
    -> ChainResult<Vec<u8>>;
}
