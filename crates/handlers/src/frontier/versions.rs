//! Known layouts of the Frontier events.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::{DomainError, DomainResult};
use sluice_core::models::H160;

use crate::utils::{named, parse_bytes, parse_h160, parse_hash256, parse_list, positional};

/// An EVM log, whatever the runtime that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmLogRecord {
    pub address: H160,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// `EVM.Log` layouts on Moonriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmLogEvent {
    /// `(log)`, delivered as the log struct itself.
    V900,
    /// `{log}`
    V1300,
}

impl VersionedSchema for EvmLogEvent {
    type Record = EvmLogRecord;

    const KIND: ItemKind = ItemKind::event("EVM", "Log");
    const VERSIONS: &'static [Self] = &[Self::V900, Self::V1300];

    fn fingerprint(self) -> &'static str {
        match self {
            Self::V900 => "0x9f0917cd12729039ba8936bb7a0613d10c58225430818b1bbdf2ff2c0616a94d",
            Self::V1300 => "0xf2ed9027e6a170578ae3c67793f61cf5f1ff0278889e49b2019c650711b450a4",
        }
    }

    fn decode(self, args: &Value) -> DomainResult<EvmLogRecord> {
        let log = match self {
            Self::V900 => args,
            Self::V1300 => args
                .get("log")
                .ok_or_else(|| DomainError::DecodingError("EVM.Log: missing log".into()))?,
        };
        Ok(EvmLogRecord {
            address: named(log, "address", parse_h160)?,
            topics: named(log, "topics", |v| parse_list(v, parse_hash256))?,
            data: named(log, "data", parse_bytes)?,
        })
    }
}

/// The part of `Ethereum.Executed` the processor uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedRecord {
    pub from: H160,
    pub to: H160,
    pub transaction_hash: [u8; 32],
}

/// `Ethereum.Executed` layouts on Moonriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutedEvent {
    /// `(from, to, transaction_hash, exit_reason)`
    V900,
    /// `{from, to, transaction_hash, exit_reason}`
    V1300,
}

impl VersionedSchema for ExecutedEvent {
    type Record = ExecutedRecord;

    const KIND: ItemKind = ItemKind::event("Ethereum", "Executed");
    const VERSIONS: &'static [Self] = &[Self::V900, Self::V1300];

    fn fingerprint(self) -> &'static str {
        match self {
            Self::V900 => "0x9bbf7a84238c0ac6baa52dad809423a1fb29b3e4ba0f136a89d324b8a4cec32e",
            Self::V1300 => "0xf5f2cfec16a3210e5efe874adbb15d2dbad8aa629433dc1119239dfcd513362e",
        }
    }

    fn decode(self, args: &Value) -> DomainResult<ExecutedRecord> {
        match self {
            Self::V900 => Ok(ExecutedRecord {
                from: positional(args, 0, parse_h160)?,
                to: positional(args, 1, parse_h160)?,
                transaction_hash: positional(args, 2, parse_hash256)?,
            }),
            Self::V1300 => Ok(ExecutedRecord {
                from: named(args, "from", parse_h160)?,
                to: named(args, "to", parse_h160)?,
                transaction_hash: named(args, "transaction_hash", parse_hash256)?,
            }),
        }
    }
}
