//! Shared helper functions for PostgreSQL row conversion.

use sluice_core::error::{StorageError, StorageResult};

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Map a failed statement to [`StorageError::QueryError`].
pub fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

/// Parse a `NUMERIC` column read back with `::TEXT`.
pub fn parse_numeric(value: &str, field_name: &str) -> StorageResult<u128> {
    value.parse().map_err(|e| {
        StorageError::SerializationError(format!(
            "{} is not a u128: {} (value: {})",
            field_name, e, value
        ))
    })
}

/// Parse an optional `NUMERIC` column.
pub fn parse_optional_numeric(value: Option<&str>, field_name: &str) -> StorageResult<Option<u128>> {
    value.map(|v| parse_numeric(v, field_name)).transpose()
}

/// Read one entity collection out of the batch outputs.
///
/// A value that no longer deserializes into the entity type is a storage
/// serialization failure, which aborts the batch transaction.
pub fn typed_outputs<T: serde::de::DeserializeOwned>(
    outputs: &sluice_core::ports::HandlerOutputs,
    bundle: &str,
    entity_type: &str,
) -> StorageResult<Vec<T>> {
    outputs
        .get_typed(bundle, entity_type)
        .map_err(|e| StorageError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: erreurs incluent le nom du champ pour debug
    #[test]
    fn test_error_includes_field_name() {
        let bad_bytes = vec![1u8; 16]; // mauvaise longueur
        let err = bytes_to_hash32(bad_bytes, "cursor.last_hash")
            .unwrap_err()
            .to_string();
        assert!(err.contains("cursor.last_hash"));
        assert!(err.contains("expected 32"));
    }

    #[test]
    fn test_numeric_beyond_u64() {
        let big = "340282366920938463463374607431768211455";
        assert_eq!(parse_numeric(big, "transfer.amount").unwrap(), u128::MAX);
        assert!(parse_numeric("-1", "transfer.amount").is_err());
        assert_eq!(parse_optional_numeric(None, "transfer.fee").unwrap(), None);
    }
}
