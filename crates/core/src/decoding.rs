//! Versioned decoder dispatch.
//!
//! Every item kind a processor consumes (an event, a call, or a storage
//! entry) may have been encoded with several layouts over the chain's
//! history. Each layout is one variant of a closed enum implementing
//! [`VersionedSchema`]; the enum's `fingerprint` and `decode` are exhaustive
//! matches, so adding a version without its decoder does not compile.
//!
//! ```ignore
//! #[derive(Debug, Clone, Copy)]
//! enum TransferEvent { V1020, V1050, V9130 }
//!
//! impl VersionedSchema for TransferEvent {
//!     type Record = TransferRecord;
//!     const KIND: ItemKind = ItemKind::event("Balances", "Transfer");
//!     const VERSIONS: &'static [Self] = &[Self::V1020, Self::V1050, Self::V9130];
//!     fn fingerprint(self) -> &'static str { match self { ... } }
//!     fn decode(self, args: &Value) -> DomainResult<TransferRecord> { match self { ... } }
//! }
//!
//! let record = decode_versioned::<TransferEvent>(&event.fingerprint, &event.args)?;
//! ```
//!
//! An item whose fingerprint matches none of the versions yields
//! [`DomainError::UnknownSchemaVersion`]; there is no fallback decoder.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::metrics::record_unknown_schema;
use crate::models::SchemaFingerprint;

/// What sort of chain item a kind names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemClass {
    Event,
    Call,
    Storage,
}

/// Identifies an event, call, or storage entry type, e.g. `Balances.Transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKind {
    pub pallet: &'static str,
    pub name: &'static str,
    pub class: ItemClass,
}

impl ItemKind {
    pub const fn event(pallet: &'static str, name: &'static str) -> Self {
        Self {
            pallet,
            name,
            class: ItemClass::Event,
        }
    }

    pub const fn call(pallet: &'static str, name: &'static str) -> Self {
        Self {
            pallet,
            name,
            class: ItemClass::Call,
        }
    }

    pub const fn storage(pallet: &'static str, name: &'static str) -> Self {
        Self {
            pallet,
            name,
            class: ItemClass::Storage,
        }
    }

    pub fn matches(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pallet, self.name)
    }
}

/// A closed set of layouts for one item kind.
pub trait VersionedSchema: Copy + fmt::Debug + 'static {
    /// Version-independent record every variant decodes into.
    type Record;

    const KIND: ItemKind;

    /// All versions, in the order they are checked.
    const VERSIONS: &'static [Self];

    /// 0x-prefixed lowercase hex fingerprint of this version's layout.
    fn fingerprint(self) -> &'static str;

    /// Decode item arguments laid out according to this version.
    fn decode(self, args: &Value) -> DomainResult<Self::Record>;
}

/// Select the version whose fingerprint equals `fingerprint`.
pub fn resolve<S: VersionedSchema>(fingerprint: &SchemaFingerprint) -> DomainResult<S> {
    let observed = fingerprint.to_hex();
    S::VERSIONS
        .iter()
        .copied()
        .find(|version| version.fingerprint().eq_ignore_ascii_case(&observed))
        .ok_or_else(|| {
            record_unknown_schema(&S::KIND.to_string());
            DomainError::UnknownSchemaVersion {
                kind: S::KIND.to_string(),
                fingerprint: observed,
            }
        })
}

/// Resolve the version for `fingerprint` and decode `args` with it.
pub fn decode_versioned<S: VersionedSchema>(
    fingerprint: &SchemaFingerprint,
    args: &Value,
) -> DomainResult<S::Record> {
    resolve::<S>(fingerprint)?.decode(args)
}

/// Check that a schema set is well formed.
///
/// Every fingerprint must be 32 bytes of hex and no two versions may share
/// one. Bundles call this from their tests.
pub fn validate_versions<S: VersionedSchema>() -> Result<(), String> {
    if S::VERSIONS.is_empty() {
        return Err(format!("{} has no versions", S::KIND));
    }

    let mut seen = HashSet::new();
    for version in S::VERSIONS {
        let fp = version.fingerprint();
        SchemaFingerprint::from_hex(fp)
            .map_err(|e| format!("{} {:?}: bad fingerprint {}: {}", S::KIND, version, fp, e))?;
        if !seen.insert(fp.to_ascii_lowercase()) {
            return Err(format!("{} {:?}: duplicate fingerprint {}", S::KIND, version, fp));
        }
    }
    Ok(())
}
