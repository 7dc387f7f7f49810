//! Known layouts of the staking storage entries.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::{DomainError, DomainResult};
use sluice_core::models::AccountId;

use crate::utils::{named, nullable, parse_account, parse_amount, parse_list, parse_u32, parse_u64};

/// `Staking.ActiveEra` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEraRecord {
    pub index: u32,
    /// Era start in unix milliseconds, set in the first block of the era.
    pub start: Option<u64>,
}

/// Stake behind one validator in one era.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposureRecord {
    pub total: u128,
    pub own: u128,
    pub others: Vec<(AccountId, u128)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveEraStorage {
    /// `{index, start?}`
    V0,
}

impl VersionedSchema for ActiveEraStorage {
    type Record = ActiveEraRecord;

    const KIND: ItemKind = ItemKind::storage("Staking", "ActiveEra");
    const VERSIONS: &'static [Self] = &[Self::V0];

    fn fingerprint(self) -> &'static str {
        "0xce453fa5f7729d2363eb56eef50471caf5268d05f49785302bf846be5aaf1b92"
    }

    fn decode(self, value: &Value) -> DomainResult<ActiveEraRecord> {
        Ok(ActiveEraRecord {
            index: named(value, "index", parse_u32)?,
            start: named(value, "start", |v| nullable(v, parse_u64))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorsStorage {
    /// `Vec<AccountId>`
    V0,
}

impl VersionedSchema for ValidatorsStorage {
    type Record = Vec<AccountId>;

    const KIND: ItemKind = ItemKind::storage("Session", "Validators");
    const VERSIONS: &'static [Self] = &[Self::V0];

    fn fingerprint(self) -> &'static str {
        "0xa1316ca07c609928a4ba265249721b2e5de623f30a70d9b0ac580a8cc4683204"
    }

    fn decode(self, value: &Value) -> DomainResult<Vec<AccountId>> {
        parse_list(value, parse_account)
            .ok_or_else(|| DomainError::DecodingError(format!("invalid validator set: {}", value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasStakersStorage {
    /// `{total, own, others: [{who, value}]}`
    V0,
}

impl VersionedSchema for ErasStakersStorage {
    type Record = ExposureRecord;

    const KIND: ItemKind = ItemKind::storage("Staking", "ErasStakers");
    const VERSIONS: &'static [Self] = &[Self::V0];

    fn fingerprint(self) -> &'static str {
        "0x53d18cb8e84a444791f958b253614ac31f32e82a1df24c07c6d4e2f255f4743f"
    }

    fn decode(self, value: &Value) -> DomainResult<ExposureRecord> {
        Ok(ExposureRecord {
            total: named(value, "total", parse_amount)?,
            own: named(value, "own", parse_amount)?,
            others: named(value, "others", |v| parse_list(v, parse_individual))?,
        })
    }
}

fn parse_individual(value: &Value) -> Option<(AccountId, u128)> {
    let who = value.get("who").and_then(parse_account)?;
    let stake = value.get("value").and_then(parse_amount)?;
    Some((who, stake))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::decoding::{decode_versioned, validate_versions};
    use sluice_core::models::SchemaFingerprint;

    use crate::testing::{account, fp, hex32};

    #[test]
    fn test_fingerprints_match_descriptors() {
        let cases = [
            (ActiveEraStorage::V0.fingerprint(), "{index:u32,start:Option<u64>}"),
            (ValidatorsStorage::V0.fingerprint(), "Vec<[u8;32]>"),
            (
                ErasStakersStorage::V0.fingerprint(),
                "{total:Compact<u128>,own:Compact<u128>,others:Vec<{who:[u8;32],value:Compact<u128>}>}",
            ),
        ];
        for (fingerprint, descriptor) in cases {
            assert_eq!(fingerprint, SchemaFingerprint::of_descriptor(descriptor).to_hex());
        }
        validate_versions::<ActiveEraStorage>().unwrap();
        validate_versions::<ValidatorsStorage>().unwrap();
        validate_versions::<ErasStakersStorage>().unwrap();
    }

    #[test]
    fn test_active_era_start_is_optional() {
        let fingerprint = fp(ActiveEraStorage::V0.fingerprint());
        let started = decode_versioned::<ActiveEraStorage>(&fingerprint, &json!({"index": "812", "start": "1668000000000"})).unwrap();
        assert_eq!(started, ActiveEraRecord { index: 812, start: Some(1_668_000_000_000) });

        let pending = decode_versioned::<ActiveEraStorage>(&fingerprint, &json!({"index": 813, "start": null})).unwrap();
        assert!(pending.start.is_none());
    }

    #[test]
    fn test_exposure_with_nominators() {
        let value = json!({
            "total": "3000",
            "own": "1000",
            "others": [{"who": hex32(7), "value": "2000"}],
        });
        let exposure = decode_versioned::<ErasStakersStorage>(&fp(ErasStakersStorage::V0.fingerprint()), &value).unwrap();
        assert_eq!(exposure.others, vec![(account(7), 2000)]);
        assert_eq!(exposure.total, 3000);

        // Un nominateur mal formé invalide toute l'exposition
        let bad = json!({"total": "1", "own": "1", "others": [{"who": "0x01"}]});
        assert!(decode_versioned::<ErasStakersStorage>(&fp(ErasStakersStorage::V0.fingerprint()), &bad).is_err());
    }
}
