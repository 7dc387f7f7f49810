//! Known layouts of `Contracts.ContractEmitted`.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::DomainResult;
use sluice_core::models::AccountId;

use crate::utils::{named, parse_account, parse_bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEmittedRecord {
    pub contract: AccountId,
    /// SCALE-encoded contract event.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractEmittedEvent {
    /// `{contract, data}`
    V0,
}

impl VersionedSchema for ContractEmittedEvent {
    type Record = ContractEmittedRecord;

    const KIND: ItemKind = ItemKind::event("Contracts", "ContractEmitted");
    const VERSIONS: &'static [Self] = &[Self::V0];

    fn fingerprint(self) -> &'static str {
        "0x2648cdfaf13be4f1feafcec1d3098e3588c156649ae64c5d7edc806fd7c639f0"
    }

    fn decode(self, args: &Value) -> DomainResult<ContractEmittedRecord> {
        Ok(ContractEmittedRecord {
            contract: named(args, "contract", parse_account)?,
            data: named(args, "data", parse_bytes)?,
        })
    }
}
