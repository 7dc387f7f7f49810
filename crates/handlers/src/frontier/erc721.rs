//! The slice of the ERC-721 ABI the frontier bundle needs.

use primitive_types::U256;

use sluice_core::error::{DomainError, DomainResult};
use sluice_core::models::H160;

use super::versions::EvmLogRecord;

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: [u8; 32] = [
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
];

/// Selector of `tokenURI(uint256)`.
pub const TOKEN_URI_SELECTOR: [u8; 4] = [0xc8, 0x7b, 0x56, 0xdd];

/// A decoded `Transfer(address indexed, address indexed, uint256 indexed)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub from: H160,
    pub to: H160,
    /// Big-endian `uint256`.
    pub token_id: [u8; 32],
}

impl TransferLog {
    /// Token id in decimal.
    pub fn token_id_string(&self) -> String {
        U256::from_big_endian(&self.token_id).to_string()
    }
}

pub fn decode_transfer(log: &EvmLogRecord) -> DomainResult<TransferLog> {
    match log.topics.as_slice() {
        [topic0, from, to, token_id] if *topic0 == TRANSFER_TOPIC => Ok(TransferLog {
            from: address_from_word(from),
            to: address_from_word(to),
            token_id: *token_id,
        }),
        topics => Err(DomainError::DecodingError(format!(
            "not an ERC-721 Transfer log ({} topics)",
            topics.len()
        ))),
    }
}

fn address_from_word(word: &[u8; 32]) -> H160 {
    let mut address = [0u8; 20];
    address.copy_from_slice(&word[12..]);
    H160(address)
}

/// Calldata for `tokenURI(token_id)`.
pub fn token_uri_call(token_id: &[u8; 32]) -> Vec<u8> {
    let mut data = TOKEN_URI_SELECTOR.to_vec();
    data.extend_from_slice(token_id);
    data
}

/// Decode an ABI-encoded `string` return value.
///
/// Layout: offset word, then at that offset a length word followed by the
/// UTF-8 bytes.
pub fn decode_string(output: &[u8]) -> DomainResult<String> {
    let invalid = |what: &str| DomainError::DecodingError(format!("invalid ABI string: {}", what));

    let offset = read_word(output, 0).ok_or_else(|| invalid("missing offset"))?;
    let length = read_word(output, offset).ok_or_else(|| invalid("missing length"))?;
    let start = offset.checked_add(32).ok_or_else(|| invalid("offset overflow"))?;
    let end = start.checked_add(length).ok_or_else(|| invalid("length overflow"))?;
    let bytes = output.get(start..end).ok_or_else(|| invalid("truncated"))?;

    String::from_utf8(bytes.to_vec()).map_err(|_| invalid("not UTF-8"))
}

fn read_word(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(32)?)?;
    let value = U256::from_big_endian(word);
    (value <= U256::from(u32::MAX)).then(|| value.as_usize())
}
