//! Shared utilities for bundle decoders.
//!
//! Schema versions know their exact layout, so fields are fetched either by
//! name or by position. Parsers accept the JSON shapes the node adapter
//! produces (hex strings for byte arrays, decimal strings for integers)
//! as well as plain numbers and byte arrays used in fixtures.

use chrono::{DateTime, Utc};
use serde_json::Value;

use sluice_core::error::{DomainError, DomainResult};
use sluice_core::models::{AccountId, H160, timestamp_from_millis};
use sluice_core::ports::RawBlock;

// =============================================================================
// Field extraction
// =============================================================================

/// Named field of a struct-like layout.
pub fn named<T>(data: &Value, key: &str, parser: fn(&Value) -> Option<T>) -> DomainResult<T> {
    let value = data
        .get(key)
        .filter(|_| data.is_object())
        .ok_or_else(|| DomainError::DecodingError(format!("missing field '{}'", key)))?;
    parser(value)
        .ok_or_else(|| DomainError::DecodingError(format!("invalid field '{}': {}", key, value)))
}

/// Positional field of a tuple-like layout.
pub fn positional<T>(
    data: &Value,
    index: usize,
    parser: fn(&Value) -> Option<T>,
) -> DomainResult<T> {
    let value = data
        .as_array()
        .and_then(|fields| fields.get(index))
        .ok_or_else(|| DomainError::DecodingError(format!("missing field #{}", index)))?;
    parser(value)
        .ok_or_else(|| DomainError::DecodingError(format!("invalid field #{}: {}", index, value)))
}

/// Wrap a parser so that JSON null (an `Option::None`) is accepted.
pub fn nullable<T>(value: &Value, parser: fn(&Value) -> Option<T>) -> Option<Option<T>> {
    match value {
        Value::Null => Some(None),
        other => parser(other).map(Some),
    }
}

// =============================================================================
// Account parsing
// =============================================================================

/// Parse an account ID from various JSON representations.
///
/// Handles:
/// - Hex string: `"0x1234..."`
/// - Wrapped object: `{ "Id": "0x..." }`
/// - Byte array: `[b0, b1, ..., b31]`
pub fn parse_account(value: &Value) -> Option<AccountId> {
    match value {
        Value::Object(obj) => obj.get("Id").and_then(parse_account),
        other => {
            let bytes: [u8; 32] = parse_bytes(other)?.try_into().ok()?;
            Some(AccountId(bytes))
        }
    }
}

/// Parse a 20-byte EVM address.
pub fn parse_h160(value: &Value) -> Option<H160> {
    let bytes: [u8; 20] = parse_bytes(value)?.try_into().ok()?;
    Some(H160(bytes))
}

// =============================================================================
// Numeric parsing
// =============================================================================

/// Parse an amount (u128) from JSON.
///
/// Handles both numeric and string representations, which is important
/// because JSON numbers are limited to u64 but Substrate amounts can be u128.
pub fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a u32 from JSON.
pub fn parse_u32(value: &Value) -> Option<u32> {
    parse_u64(value).and_then(|v| v.try_into().ok())
}

// =============================================================================
// Hash/bytes parsing
// =============================================================================

/// Parse a 32-byte hash from JSON.
pub fn parse_hash256(value: &Value) -> Option<[u8; 32]> {
    parse_bytes(value)?.try_into().ok()
}

/// Parse arbitrary bytes from JSON.
///
/// Handles:
/// - Hex string: `"0x1234..."` (prefix optional)
/// - Byte array: `[b0, b1, ...]`, numbers or decimal strings
pub fn parse_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => {
            let hex_str = s.strip_prefix("0x").unwrap_or(s);
            hex::decode(hex_str).ok()
        }
        Value::Array(arr) => arr
            .iter()
            .map(|v| parse_u64(v).and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

/// Parse a list, failing if any element does not parse.
pub fn parse_list<T>(value: &Value, parser: fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    value.as_array()?.iter().map(parser).collect()
}

// =============================================================================
// Blocks
// =============================================================================

/// Block time, required by every entity that records when it happened.
pub fn block_timestamp(block: &RawBlock) -> DomainResult<DateTime<Utc>> {
    block
        .timestamp
        .and_then(timestamp_from_millis)
        .ok_or_else(|| DomainError::ValidationError(format!("block #{} has no timestamp", block.number)))
}

// =============================================================================
// Tests
// =============================================================================
