//! SCALE value to JSON conversion.
//!
//! Decoded values carry their type id, which is used to render byte
//! sequences (`[u8; N]`, `Vec<u8>`) as `0x` hex strings whatever their
//! length. Large integers become decimal strings so that u128 amounts
//! survive JSON.

use scale_info::{PortableRegistry, TypeDef, TypeDefPrimitive};
use serde_json::Value as Json;
use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};

use sluice_core::error::{ChainError, ChainResult};

/// Converts decoded values using the registry they were decoded with.
pub struct JsonEncoder<'a> {
    types: &'a PortableRegistry,
}

impl<'a> JsonEncoder<'a> {
    pub fn new(types: &'a PortableRegistry) -> Self {
        Self { types }
    }

    /// Convert an event's or call's field list.
    pub fn fields(&self, composite: &Composite<u32>) -> Json {
        self.composite(composite)
    }

    /// Convert a single value.
    pub fn value(&self, value: &Value<u32>) -> Json {
        if self.is_byte_sequence(value.context)
            && let ValueDef::Composite(Composite::Unnamed(values)) = &value.value
            && let Some(bytes) = collect_bytes(values)
        {
            return Json::String(format!("0x{}", hex::encode(bytes)));
        }

        match &value.value {
            // Sequences stay arrays even with a single element
            ValueDef::Composite(Composite::Unnamed(values)) if self.is_collection(value.context) => {
                Json::Array(values.iter().map(|v| self.value(v)).collect())
            }
            ValueDef::Composite(composite) => self.composite(composite),
            ValueDef::Variant(variant) => {
                let inner = self.composite(&variant.values);
                match variant.name.as_str() {
                    // Option and MultiAddress::Id collapse to their payload
                    "Some" | "Id" => inner,
                    "None" => Json::Null,
                    name => {
                        let mut map = serde_json::Map::new();
                        map.insert(name.to_string(), inner);
                        Json::Object(map)
                    }
                }
            }
            ValueDef::Primitive(primitive) => primitive_to_json(primitive),
            ValueDef::BitSequence(bits) => Json::String(format!("{:?}", bits)),
        }
    }

    fn composite(&self, composite: &Composite<u32>) -> Json {
        match composite {
            Composite::Unnamed(values) => {
                // Unwrap single-element tuples (newtypes like AccountId32)
                if let [single] = values.as_slice() {
                    return self.value(single);
                }
                Json::Array(values.iter().map(|v| self.value(v)).collect())
            }
            Composite::Named(fields) => {
                let obj: serde_json::Map<String, Json> = fields
                    .iter()
                    .map(|(name, v)| (name.clone(), self.value(v)))
                    .collect();
                Json::Object(obj)
            }
        }
    }

    fn is_collection(&self, type_id: u32) -> bool {
        matches!(
            self.types.resolve(type_id).map(|t| &t.type_def),
            Some(TypeDef::Sequence(_) | TypeDef::Array(_) | TypeDef::Tuple(_))
        )
    }

    fn is_byte_sequence(&self, type_id: u32) -> bool {
        let element = match self.types.resolve(type_id).map(|t| &t.type_def) {
            Some(TypeDef::Sequence(s)) => s.type_param.id,
            Some(TypeDef::Array(a)) => a.type_param.id,
            _ => return false,
        };
        matches!(
            self.types.resolve(element).map(|t| &t.type_def),
            Some(TypeDef::Primitive(TypeDefPrimitive::U8))
        )
    }
}

fn collect_bytes(values: &[Value<u32>]) -> Option<Vec<u8>> {
    values
        .iter()
        .map(|value| match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect()
}

/// Convert a Primitive to a JSON value.
fn primitive_to_json(primitive: &Primitive) -> Json {
    match primitive {
        Primitive::Bool(b) => Json::Bool(*b),
        Primitive::Char(c) => Json::String(c.to_string()),
        Primitive::String(s) => Json::String(s.clone()),
        Primitive::U128(n) => Json::String(n.to_string()),
        Primitive::I128(n) => Json::String(n.to_string()),
        Primitive::U256(n) => Json::String(format!("0x{}", hex::encode(n))),
        Primitive::I256(n) => Json::String(format!("0x{}", hex::encode(n))),
    }
}

/// Convert a JSON storage key back into a SCALE value.
///
/// `0x` strings become byte sequences, numbers and decimal strings become
/// unsigned integers; arrays and objects map to composites.
pub fn json_to_key(key: &Json) -> ChainResult<Value> {
    let invalid = || ChainError::StorageReadError {
        entry: "key".to_string(),
        message: format!("unsupported key {}", key),
    };

    match key {
        Json::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => hex::decode(hex_str)
                .map(Value::from_bytes)
                .map_err(|_| invalid()),
            None => s.parse::<u128>().map(Value::u128).map_err(|_| invalid()),
        },
        Json::Number(n) => n.as_u64().map(|n| Value::u128(n.into())).ok_or_else(invalid),
        Json::Bool(b) => Ok(Value::bool(*b)),
        Json::Array(items) => Ok(Value::unnamed_composite(
            items.iter().map(json_to_key).collect::<ChainResult<Vec<_>>>()?,
        )),
        Json::Object(fields) => Ok(Value::named_composite(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_key(v)?)))
                .collect::<ChainResult<Vec<_>>>()?,
        )),
        Json::Null => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_scale_codec::Encode;
    use scale_info::{Registry, TypeInfo, meta_type};
    use serde_json::json;
    use subxt::ext::scale_value::scale::decode_as_type;

    #[derive(Encode, TypeInfo)]
    struct AccountId32([u8; 32]);

    #[derive(Encode, TypeInfo)]
    enum Data {
        None,
        Raw5([u8; 5]),
    }

    #[derive(Encode, TypeInfo)]
    struct Transfer {
        from: AccountId32,
        to: AccountId32,
        amount: u128,
    }

    #[derive(Encode, TypeInfo)]
    struct Identity {
        display: Data,
        legal: Data,
        pgp_fingerprint: Option<[u8; 20]>,
        remark: Vec<u8>,
    }

    fn to_json<T: Encode + TypeInfo + 'static>(value: &T) -> Json {
        let mut registry = Registry::new();
        let id = registry.register_type(&meta_type::<T>()).id;
        let types: PortableRegistry = registry.into();
        let bytes = value.encode();
        let decoded = decode_as_type(&mut &bytes[..], id, &types).unwrap();
        JsonEncoder::new(&types).value(&decoded)
    }

    #[test]
    fn test_transfer_accounts_are_hex_and_amount_is_string() {
        let transfer = Transfer {
            from: AccountId32([1; 32]),
            to: AccountId32([2; 32]),
            amount: u128::MAX,
        };
        assert_eq!(
            to_json(&transfer),
            json!({
                "from": format!("0x{}", "01".repeat(32)),
                "to": format!("0x{}", "02".repeat(32)),
                "amount": u128::MAX.to_string(),
            })
        );
    }

    #[test]
    fn test_variants_and_short_byte_sequences() {
        let identity = Identity {
            display: Data::Raw5(*b"alice"),
            legal: Data::None,
            pgp_fingerprint: Some([0xaa; 20]),
            remark: b"RMRK".to_vec(),
        };
        assert_eq!(
            to_json(&identity),
            json!({
                "display": { "Raw5": "0x616c696365" },
                "legal": null,
                "pgp_fingerprint": format!("0x{}", "aa".repeat(20)),
                "remark": "0x524d524b",
            })
        );
    }

    #[test]
    fn test_single_element_sequence_stays_array() {
        let validators = vec![AccountId32([3; 32])];
        assert_eq!(
            to_json(&validators),
            json!([format!("0x{}", "03".repeat(32))])
        );
    }

    #[test]
    fn test_json_to_key() {
        let account = json!(format!("0x{}", "ab".repeat(32)));
        assert_eq!(json_to_key(&account).unwrap(), Value::from_bytes([0xab; 32]));
        assert_eq!(json_to_key(&json!(42)).unwrap(), Value::u128(42));
        assert_eq!(json_to_key(&json!("1000")).unwrap(), Value::u128(1000));
        assert!(json_to_key(&json!(null)).is_err());
        assert!(json_to_key(&json!("0xzz")).is_err());
    }
}
