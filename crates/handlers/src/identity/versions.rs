//! Known layouts of the identity calls.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::{DomainError, DomainResult};

use crate::utils::{named, parse_bytes};

/// The identity fields the processor keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    pub display: Option<String>,
    pub legal: Option<String>,
    pub web: Option<String>,
    pub riot: Option<String>,
    pub email: Option<String>,
    pub twitter: Option<String>,
}

/// `Identity.set_identity` layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetIdentityCall {
    /// `{info}` without a twitter handle.
    V1030,
    /// `{info}` with `twitter`.
    V1032,
}

impl VersionedSchema for SetIdentityCall {
    type Record = IdentityRecord;

    const KIND: ItemKind = ItemKind::call("Identity", "set_identity");
    const VERSIONS: &'static [Self] = &[Self::V1030, Self::V1032];

    fn fingerprint(self) -> &'static str {
        match self {
            Self::V1030 => "0xa46d879f3f7de6d020ef64de1991a935b8e44310b7345657605ae7c53f32f485",
            Self::V1032 => "0xa5ca4ee571eccac03419645f8d523280a2028ba2dd1d39868868f8500dcbd550",
        }
    }

    fn decode(self, args: &Value) -> DomainResult<IdentityRecord> {
        let info = args
            .get("info")
            .filter(|info| info.is_object())
            .ok_or_else(|| DomainError::DecodingError("set_identity: missing info".into()))?;

        Ok(IdentityRecord {
            display: named(info, "display", unwrap_data)?,
            legal: named(info, "legal", unwrap_data)?,
            web: named(info, "web", unwrap_data)?,
            riot: named(info, "riot", unwrap_data)?,
            email: named(info, "email", unwrap_data)?,
            twitter: match self {
                Self::V1030 => None,
                Self::V1032 => named(info, "twitter", unwrap_data)?,
            },
        })
    }
}

/// `Identity.clear_indentity` layouts. The call takes no arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearIdentityCall {
    V1030,
}

impl VersionedSchema for ClearIdentityCall {
    type Record = ();

    const KIND: ItemKind = ItemKind::call("Identity", "clear_indentity");
    const VERSIONS: &'static [Self] = &[Self::V1030];

    fn fingerprint(self) -> &'static str {
        "0x2e38e77b22c314a449e91fafed92a43826ac6aa403ae6a8acb6cf58239fbaf5d"
    }

    fn decode(self, _args: &Value) -> DomainResult<()> {
        Ok(())
    }
}

/// Text carried by an identity `Data` field.
///
/// Returns `Some(None)` for `None` and the hash kinds, `Some(Some(text))`
/// for `RawN`, and `None` when the value is not a `Data` at all.
pub fn unwrap_data(value: &Value) -> Option<Option<String>> {
    let map = match value {
        Value::Null => return Some(None),
        Value::Object(map) if map.len() == 1 => map,
        _ => return None,
    };
    let (kind, inner) = map.iter().next()?;
    match kind.as_str() {
        "None" | "BlakeTwo256" | "Sha256" | "Keccak256" | "ShaThree256" => Some(None),
        raw if raw.starts_with("Raw") => {
            let bytes = parse_bytes(inner)?;
            Some(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => None,
    }
}
