//! Known layouts of `System.remark`.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::DomainResult;

use crate::utils::{named, parse_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemarkCall {
    /// `{remark}`
    V1020,
}

impl VersionedSchema for RemarkCall {
    /// Raw remark bytes.
    type Record = Vec<u8>;

    const KIND: ItemKind = ItemKind::call("System", "remark");
    const VERSIONS: &'static [Self] = &[Self::V1020];

    fn fingerprint(self) -> &'static str {
        "0xf3ca3f729cc774a8d3d6cf0ab2bff7eac4969a84fb24f2d4b79737ea3ce4e030"
    }

    fn decode(self, args: &Value) -> DomainResult<Vec<u8>> {
        named(args, "remark", parse_bytes)
    }
}
