//! Known layouts of `Balances.Transfer`.

use serde_json::Value;

use sluice_core::decoding::{ItemKind, VersionedSchema};
use sluice_core::error::DomainResult;
use sluice_core::models::AccountId;

use crate::utils::{named, parse_account, parse_amount, positional};

/// A transfer, whatever the runtime that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u128,
}

/// `Balances.Transfer` layouts on Kusama.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// `(from, to, amount, fee)`
    V1020,
    /// `(from, to, amount)`
    V1050,
    /// `{from, to, amount}`
    V9130,
}

impl VersionedSchema for TransferEvent {
    type Record = TransferRecord;

    const KIND: ItemKind = ItemKind::event("Balances", "Transfer");
    const VERSIONS: &'static [Self] = &[Self::V1020, Self::V1050, Self::V9130];

    fn fingerprint(self) -> &'static str {
        match self {
            Self::V1020 => "0x4faed3d4318716acc69d8ba4a2f11bb351e1e721d20b2d0d2bb4a1ef6599d22b",
            Self::V1050 => "0xe01077bf2d18db1648a96a187de3a5f2ddd737858fc951f963668fef2c2f72f4",
            Self::V9130 => "0xd4e0afbc07e20e8f388792f44c27b6fc85ae72799fd1fa047b506ae28c260bad",
        }
    }

    fn decode(self, args: &Value) -> DomainResult<TransferRecord> {
        match self {
            // The V1020 fee is the transfer fee of the old runtime, not the
            // extrinsic fee; it is not carried over.
            Self::V1020 | Self::V1050 => Ok(TransferRecord {
                from: positional(args, 0, parse_account)?,
                to: positional(args, 1, parse_account)?,
                amount: positional(args, 2, parse_amount)?,
            }),
            Self::V9130 => Ok(TransferRecord {
                from: named(args, "from", parse_account)?,
                to: named(args, "to", parse_account)?,
                amount: named(args, "amount", parse_amount)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::decoding::{decode_versioned, validate_versions};
    use sluice_core::error::DomainError;
    use sluice_core::models::SchemaFingerprint;

    use crate::testing::{account, fp, hex32};

    #[test]
    fn test_fingerprints_match_descriptors() {
        let cases = [
            (TransferEvent::V1020, "([u8;32],[u8;32],u128,u128)"),
            (TransferEvent::V1050, "([u8;32],[u8;32],u128)"),
            (TransferEvent::V9130, "{from:[u8;32],to:[u8;32],amount:u128}"),
        ];
        for (version, descriptor) in cases {
            assert_eq!(
                SchemaFingerprint::of_descriptor(descriptor).to_hex(),
                version.fingerprint(),
                "{version:?}"
            );
        }
        validate_versions::<TransferEvent>().unwrap();
    }

    #[test]
    fn test_each_version_decodes() {
        let positional_fee = json!([hex32(1), hex32(2), "1000", "10"]);
        let positional = json!([hex32(1), hex32(2), "1000"]);
        let named_args = json!({"from": hex32(1), "to": hex32(2), "amount": "1000"});
        let expected = TransferRecord {
            from: account(1),
            to: account(2),
            amount: 1000,
        };

        for (version, args) in [
            (TransferEvent::V1020, &positional_fee),
            (TransferEvent::V1050, &positional),
            (TransferEvent::V9130, &named_args),
        ] {
            let record = decode_versioned::<TransferEvent>(&fp(version.fingerprint()), args).unwrap();
            assert_eq!(record, expected, "{version:?}");
        }
    }

    // Payload (from, to, amount) sous l'empreinte V1020
    #[test]
    fn test_v1020_three_field_payload() {
        let args = json!([hex32(1), hex32(2), "340282366920938463463374607431768211455"]);
        let record =
            decode_versioned::<TransferEvent>(&fp(TransferEvent::V1020.fingerprint()), &args).unwrap();
        assert_eq!(record.from, account(1));
        assert_eq!(record.to, account(2));
        assert_eq!(record.amount, u128::MAX);
    }

    #[test]
    fn test_unknown_fingerprint() {
        let args = json!({"from": hex32(1), "to": hex32(2), "amount": "1"});
        let err = decode_versioned::<TransferEvent>(&fp(&hex32(9)), &args).unwrap_err();
        assert!(matches!(
            err,
            DomainError::UnknownSchemaVersion { ref kind, .. } if kind == "Balances.Transfer"
        ));
    }

    #[test]
    fn test_named_payload_under_positional_version_fails() {
        let args = json!({"from": hex32(1), "to": hex32(2), "amount": "1"});
        assert!(TransferEvent::V1050.decode(&args).is_err());
    }
}
